use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::OnceCell;

use inventa_config::EmbeddingProviderConfig;
use inventa_domain::{chunk::VectorRecord, similarity::IndexMatch};

use crate::{EmbeddingProvider, Error, Result, VectorIndex};

/// Embedding and vector index calls with a shared readiness gate and a per-call deadline.
pub struct IndexAdapter {
	embedding_cfg: EmbeddingProviderConfig,
	embedder: Arc<dyn EmbeddingProvider>,
	index: Arc<dyn VectorIndex>,
	ready: OnceCell<()>,
	call_timeout: Duration,
}
impl IndexAdapter {
	pub fn new(
		embedding_cfg: EmbeddingProviderConfig,
		embedder: Arc<dyn EmbeddingProvider>,
		index: Arc<dyn VectorIndex>,
		call_timeout: Duration,
	) -> Self {
		Self { embedding_cfg, embedder, index, ready: OnceCell::new(), call_timeout }
	}

	/// Embeds one text. Blank text yields an empty vector without calling the provider.
	pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		if text.trim().is_empty() {
			return Ok(Vec::new());
		}

		let texts = [text.to_string()];
		let vectors = self
			.with_deadline("Embedding request", self.embedder.embed(&self.embedding_cfg, &texts))
			.await??;

		vectors.into_iter().next().ok_or_else(|| Error::Provider {
			message: "Embedding provider returned no vector.".to_string(),
		})
	}

	/// Initializes the index once per adapter. Concurrent callers wait on the same attempt, and a
	/// failed attempt leaves the gate open for the next caller.
	pub async fn ensure_ready(&self) -> Result<()> {
		self.ready
			.get_or_try_init(|| async {
				self.index.initialize().await?;

				tracing::info!("Vector index is ready.");

				Ok::<(), Error>(())
			})
			.await?;

		Ok(())
	}

	pub fn is_ready(&self) -> bool {
		self.ready.initialized()
	}

	pub async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
		if records.is_empty() {
			return Ok(());
		}

		self.ensure_ready().await?;
		self.with_deadline("Index upsert", self.index.upsert(records)).await?
	}

	pub async fn query(&self, vector: &[f32], top_k: u32) -> Result<Vec<IndexMatch>> {
		if vector.is_empty() || top_k == 0 {
			return Ok(Vec::new());
		}

		self.ensure_ready().await?;
		self.with_deadline("Index query", self.index.query(vector, top_k)).await?
	}

	async fn with_deadline<F>(&self, operation: &'static str, fut: F) -> Result<F::Output>
	where
		F: Future,
	{
		tokio::time::timeout(self.call_timeout, fut).await.map_err(|_| Error::Timeout {
			operation,
			timeout_ms: self.call_timeout.as_millis() as u64,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use serde_json::Map;
	use uuid::Uuid;

	use inventa_domain::chunk::{ChunkMetadata, ChunkType};

	use super::*;
	use crate::BoxFuture;

	struct SpyEmbedding {
		calls: Arc<AtomicUsize>,
	}

	impl EmbeddingProvider for SpyEmbedding {
		fn embed<'a>(
			&'a self,
			_: &'a EmbeddingProviderConfig,
			texts: &'a [String],
		) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				Ok(texts.iter().map(|text| vec![text.len() as f32, 1.0]).collect())
			})
		}
	}

	struct SpyIndex {
		initializations: Arc<AtomicUsize>,
		upserts: Arc<AtomicUsize>,
		init_delay: Duration,
		fail_first_init: bool,
	}

	impl VectorIndex for SpyIndex {
		fn initialize(&self) -> BoxFuture<'_, Result<()>> {
			Box::pin(async move {
				let call = self.initializations.fetch_add(1, Ordering::SeqCst);

				tokio::time::sleep(self.init_delay).await;

				if self.fail_first_init && call == 0 {
					return Err(Error::Index { message: "collection unavailable".to_string() });
				}

				Ok(())
			})
		}

		fn upsert<'a>(&'a self, _: &'a [VectorRecord]) -> BoxFuture<'a, Result<()>> {
			self.upserts.fetch_add(1, Ordering::SeqCst);

			Box::pin(async { Ok(()) })
		}

		fn query<'a>(&'a self, _: &'a [f32], _: u32) -> BoxFuture<'a, Result<Vec<IndexMatch>>> {
			Box::pin(async {
				tokio::time::sleep(Duration::from_secs(5)).await;

				Ok(Vec::new())
			})
		}
	}

	fn embedding_cfg() -> EmbeddingProviderConfig {
		EmbeddingProviderConfig {
			provider_id: "spy".to_string(),
			api_base: "http://127.0.0.1:1".to_string(),
			api_key: "key".to_string(),
			path: "/embeddings".to_string(),
			model: "spy".to_string(),
			dimensions: 2,
			timeout_ms: 1_000,
			default_headers: Map::new(),
		}
	}

	fn record() -> VectorRecord {
		let disclosure_id = Uuid::new_v4();

		VectorRecord {
			id: format!("{disclosure_id}:title"),
			values: vec![1.0, 0.0],
			metadata: ChunkMetadata {
				chunk_type: ChunkType::Title,
				disclosure_id,
				docket_number: 1,
				ordinal: None,
			},
		}
	}

	fn adapter(index: SpyIndex, embed_calls: Arc<AtomicUsize>) -> IndexAdapter {
		IndexAdapter::new(
			embedding_cfg(),
			Arc::new(SpyEmbedding { calls: embed_calls }),
			Arc::new(index),
			Duration::from_millis(200),
		)
	}

	fn spy_index(fail_first_init: bool) -> (SpyIndex, Arc<AtomicUsize>, Arc<AtomicUsize>) {
		let initializations = Arc::new(AtomicUsize::new(0));
		let upserts = Arc::new(AtomicUsize::new(0));
		let index = SpyIndex {
			initializations: initializations.clone(),
			upserts: upserts.clone(),
			init_delay: Duration::from_millis(50),
			fail_first_init,
		};

		(index, initializations, upserts)
	}

	#[tokio::test]
	async fn blank_text_is_not_sent_to_the_provider() {
		let calls = Arc::new(AtomicUsize::new(0));
		let (index, _, _) = spy_index(false);
		let adapter = adapter(index, calls.clone());

		assert!(adapter.embed("   ").await.expect("Embed failed.").is_empty());
		assert_eq!(adapter.embed("abc").await.expect("Embed failed."), vec![3.0, 1.0]);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_initialization() {
		let (index, initializations, _) = spy_index(false);
		let adapter = Arc::new(adapter(index, Arc::new(AtomicUsize::new(0))));
		let mut handles = Vec::new();

		for _ in 0..8 {
			let adapter = adapter.clone();

			handles.push(tokio::spawn(async move { adapter.ensure_ready().await }));
		}
		for handle in handles {
			handle.await.expect("Task panicked.").expect("ensure_ready failed.");
		}

		assert_eq!(initializations.load(Ordering::SeqCst), 1);
		assert!(adapter.is_ready());
	}

	#[tokio::test]
	async fn failed_initialization_is_retried_by_the_next_caller() {
		let (index, initializations, _) = spy_index(true);
		let adapter = adapter(index, Arc::new(AtomicUsize::new(0)));

		assert!(adapter.ensure_ready().await.is_err());
		assert!(!adapter.is_ready());
		assert!(adapter.ensure_ready().await.is_ok());
		assert_eq!(initializations.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn empty_batch_skips_the_index() {
		let (index, initializations, upserts) = spy_index(false);
		let adapter = adapter(index, Arc::new(AtomicUsize::new(0)));

		adapter.upsert(&[]).await.expect("Upsert failed.");

		assert_eq!(upserts.load(Ordering::SeqCst), 0);
		assert_eq!(initializations.load(Ordering::SeqCst), 0);

		adapter.upsert(&[record()]).await.expect("Upsert failed.");

		assert_eq!(upserts.load(Ordering::SeqCst), 1);
		assert_eq!(initializations.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn slow_index_call_hits_the_deadline() {
		let (index, _, _) = spy_index(false);
		let adapter = adapter(index, Arc::new(AtomicUsize::new(0)));
		let err = adapter.query(&[1.0, 0.0], 3).await.expect_err("Expected a timeout.");

		assert!(matches!(err, Error::Timeout { operation: "Index query", timeout_ms: 200 }));
	}
}
