use clap::Parser;

use inventa_admin::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	inventa_admin::run(Args::parse()).await
}
