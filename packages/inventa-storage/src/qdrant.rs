use std::{future::Future, time::Duration};

use qdrant_client::qdrant::{
	CollectionStatus, CreateCollectionBuilder, Distance, VectorParamsBuilder,
};

use crate::{Error, Result};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
	pub ready_poll_attempts: u32,
	pub ready_poll_interval: Duration,
}
impl QdrantStore {
	pub fn new(cfg: &inventa_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url)
			.build()
			.map_err(|err| Error::qdrant("connect", &cfg.collection, err))?;

		Ok(Self {
			client,
			collection: cfg.collection.clone(),
			vector_dim: cfg.vector_dim,
			ready_poll_attempts: cfg.ready_poll_attempts,
			ready_poll_interval: Duration::from_millis(cfg.ready_poll_interval_ms),
		})
	}

	pub async fn collection_exists(&self) -> Result<bool> {
		let response = self
			.client
			.list_collections()
			.await
			.map_err(|err| Error::qdrant("list_collections", &self.collection, err))?;

		Ok(response.collections.iter().any(|collection| collection.name == self.collection))
	}

	/// Creates the dense cosine collection. Returns `false` when it already existed.
	pub async fn create_collection_if_missing(&self) -> Result<bool> {
		if self.collection_exists().await? {
			return Ok(false);
		}

		let builder = CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		self.client
			.create_collection(builder)
			.await
			.map_err(|err| Error::qdrant("create_collection", &self.collection, err))?;

		tracing::info!(collection = %self.collection, dim = self.vector_dim, "Created Qdrant collection.");

		Ok(true)
	}

	pub async fn is_green(&self) -> Result<bool> {
		let info = self
			.client
			.collection_info(&self.collection)
			.await
			.map_err(|err| Error::qdrant("collection_info", &self.collection, err))?;

		Ok(info.result.is_some_and(|info| info.status == CollectionStatus::Green as i32))
	}

	/// Polls the collection status until it reports green or the attempt budget runs out.
	///
	/// Best effort: a failing status call is logged and counts as one attempt.
	pub async fn wait_until_green(&self) -> bool {
		poll_until_ready(&self.collection, self.ready_poll_attempts, self.ready_poll_interval, || {
			self.is_green()
		})
		.await
	}
}

/// Runs `check` up to `attempts` times, `interval` apart, until it reports ready.
pub async fn poll_until_ready<F, Fut>(
	collection: &str,
	attempts: u32,
	interval: Duration,
	mut check: F,
) -> bool
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<bool>>,
{
	let attempts = attempts.max(1);

	for attempt in 1..=attempts {
		match check().await {
			Ok(true) => return true,
			Ok(false) => {
				tracing::debug!(collection, attempt, "Qdrant collection not ready yet.");
			},
			Err(err) => {
				tracing::warn!(collection, attempt, error = %err, "Qdrant readiness check failed.");
			},
		}

		if attempt < attempts {
			tokio::time::sleep(interval).await;
		}
	}

	false
}
