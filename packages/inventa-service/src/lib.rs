pub mod adapter;
pub mod dispatcher;
pub mod index;
pub mod ops;
pub mod producer;
pub mod records;
pub mod similar;

mod error;

pub use adapter::IndexAdapter;
pub use dispatcher::{Dispatcher, FailOutcome, PruneReport, RetryPolicy};
pub use error::{Error, Result};
pub use ops::{EventReport, FailedEvent, SweepReport};
pub use producer::CreatedDisclosure;
pub use similar::SimilarDisclosure;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use inventa_config::{Config, EmbeddingProviderConfig};
use inventa_domain::{chunk::VectorRecord, similarity::IndexMatch};
use inventa_providers::embedding;
use inventa_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

/// Remote nearest-neighbour index holding one vector per chunk.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	/// Creates the index when it is missing and waits, within a bounded budget, for it to accept
	/// traffic.
	fn initialize(&self) -> BoxFuture<'_, Result<()>>;

	/// Writes `records` keyed by chunk id. Existing ids are overwritten.
	fn upsert<'a>(&'a self, records: &'a [VectorRecord]) -> BoxFuture<'a, Result<()>>;

	fn query<'a>(&'a self, vector: &'a [f32], top_k: u32) -> BoxFuture<'a, Result<Vec<IndexMatch>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

pub struct InventaService {
	pub cfg: Config,
	pub db: Db,
	pub dispatcher: Dispatcher,
	pub adapter: Arc<IndexAdapter>,
}
impl InventaService {
	pub fn new(cfg: Config, db: Db, index: Arc<dyn VectorIndex>, providers: Providers) -> Self {
		let dispatcher = Dispatcher::new(db.clone(), &cfg.dispatcher);
		let adapter = Arc::new(IndexAdapter::new(
			cfg.providers.embedding.clone(),
			providers.embedding,
			index,
			Duration::from_millis(cfg.worker.call_timeout_ms),
		));

		Self { cfg, db, dispatcher, adapter }
	}
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding::embed(cfg, texts).await.map_err(|err| {
				tracing::warn!(
					provider_id = %cfg.provider_id,
					transient = err.is_transient(),
					error = %err,
					"Embedding request failed."
				);

				color_eyre::Report::new(err)
			})
		})
	}
}
