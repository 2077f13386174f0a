pub mod worker;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use inventa_service::{InventaService, Providers};
use inventa_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = inventa_cli::VERSION,
	rename_all = "kebab",
	styles = inventa_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = inventa_config::load(&args.config)?;

	inventa_cli::init_tracing(&config.service.log_level);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let service = InventaService::new(config, db, Arc::new(qdrant), Providers::default());

	tracing::info!(
		queue = service.dispatcher.queue(),
		concurrency = service.cfg.worker.concurrency,
		"Worker starting."
	);

	worker::run_worker(worker::WorkerState { service: Arc::new(service) }).await
}
