use clap::Parser;

use inventa_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	inventa_worker::run(Args::parse()).await
}
