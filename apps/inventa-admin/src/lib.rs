use std::{fs, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use inventa_domain::disclosure::NewDisclosure;
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
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Stores a disclosure read from a JSON file and submits its indexing job.
	Create {
		#[arg(long, short = 'f', value_name = "FILE")]
		file: PathBuf,
	},
	/// Event and job counts by status, with the latest failures.
	Report,
	/// Requeues pending events that have no live job.
	Sweep,
	/// Drops finished jobs beyond the configured retention.
	Prune,
	/// Puts a failed event back on the queue.
	Reprocess {
		#[arg(long, value_name = "UUID")]
		event_id: Uuid,
	},
	Similar {
		#[arg(long, value_name = "UUID")]
		disclosure_id: Uuid,
		#[arg(long, value_name = "N")]
		top_k: Option<u32>,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = inventa_config::load(&args.config)?;

	inventa_cli::init_tracing(&config.service.log_level);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let service = InventaService::new(config, db, Arc::new(qdrant), Providers::default());
	let output = match args.command {
		Command::Create { file } => {
			let raw = fs::read_to_string(&file)
				.map_err(|err| eyre::eyre!("Failed to read {}: {err}.", file.display()))?;
			let input: NewDisclosure = serde_json::from_str(&raw)?;
			let created = service.create_disclosure(input).await?;

			json!({
				"disclosure": created.disclosure,
				"eventId": created.event_id,
				"jobId": created.job_id,
			})
		},
		Command::Report => serde_json::to_value(service.event_report().await?)?,
		Command::Sweep =>
			serde_json::to_value(service.requeue_stale_pending(OffsetDateTime::now_utc()).await?)?,
		Command::Prune => serde_json::to_value(service.dispatcher.prune().await?)?,
		Command::Reprocess { event_id } => {
			let job_id = service.reprocess_event(event_id).await?;

			json!({ "eventId": event_id, "jobId": job_id })
		},
		Command::Similar { disclosure_id, top_k } =>
			serde_json::to_value(service.find_similar(disclosure_id, top_k).await?)?,
	};
	let json = serde_json::to_string_pretty(&output)?;

	println!("{json}");

	Ok(())
}
