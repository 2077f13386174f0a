use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub dispatcher: Dispatcher,
	#[serde(default)]
	pub worker: Worker,
	#[serde(default)]
	pub similarity: Similarity,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
	/// Number of readiness probes issued after the collection is created.
	#[serde(default = "default_ready_poll_attempts")]
	pub ready_poll_attempts: u32,
	#[serde(default = "default_ready_poll_interval_ms")]
	pub ready_poll_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_embedding_path")]
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Delivery policy of the durable job queue.
#[derive(Clone, Debug, Deserialize)]
pub struct Dispatcher {
	#[serde(default = "default_queue")]
	pub queue: String,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	/// Delay before the first redelivery. Each further redelivery doubles it.
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
	#[serde(default = "default_backoff_max_ms")]
	pub backoff_max_ms: u64,
	/// How long a claimed job stays invisible before it is redelivered.
	#[serde(default = "default_lease_seconds")]
	pub lease_seconds: u32,
	#[serde(default = "default_keep_completed")]
	pub keep_completed: u32,
	#[serde(default = "default_keep_failed")]
	pub keep_failed: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Worker {
	#[serde(default = "default_concurrency")]
	pub concurrency: u32,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Deadline applied to every embedding and index call.
	#[serde(default = "default_call_timeout_ms")]
	pub call_timeout_ms: u64,
	#[serde(default = "default_sweep_interval_seconds")]
	pub sweep_interval_seconds: u64,
	/// Pending events older than this with no live job are requeued by the sweep.
	#[serde(default = "default_stale_pending_seconds")]
	pub stale_pending_seconds: u64,
	#[serde(default = "default_prune_interval_seconds")]
	pub prune_interval_seconds: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Similarity {
	#[serde(default = "default_top_k")]
	pub default_top_k: u32,
	#[serde(default = "default_over_fetch_factor")]
	pub over_fetch_factor: u32,
}

impl Default for Dispatcher {
	fn default() -> Self {
		Self {
			queue: default_queue(),
			max_attempts: default_max_attempts(),
			backoff_base_ms: default_backoff_base_ms(),
			backoff_max_ms: default_backoff_max_ms(),
			lease_seconds: default_lease_seconds(),
			keep_completed: default_keep_completed(),
			keep_failed: default_keep_failed(),
		}
	}
}

impl Default for Worker {
	fn default() -> Self {
		Self {
			concurrency: default_concurrency(),
			poll_interval_ms: default_poll_interval_ms(),
			call_timeout_ms: default_call_timeout_ms(),
			sweep_interval_seconds: default_sweep_interval_seconds(),
			stale_pending_seconds: default_stale_pending_seconds(),
			prune_interval_seconds: default_prune_interval_seconds(),
		}
	}
}

impl Default for Similarity {
	fn default() -> Self {
		Self { default_top_k: default_top_k(), over_fetch_factor: default_over_fetch_factor() }
	}
}

pub(crate) fn default_embedding_path() -> String {
	"/embeddings".to_string()
}

fn default_ready_poll_attempts() -> u32 {
	30
}

fn default_ready_poll_interval_ms() -> u64 {
	2_000
}

fn default_queue() -> String {
	"disclosure_event".to_string()
}

fn default_max_attempts() -> u32 {
	5
}

fn default_backoff_base_ms() -> u64 {
	5_000
}

fn default_backoff_max_ms() -> u64 {
	3_600_000
}

fn default_lease_seconds() -> u32 {
	60
}

fn default_keep_completed() -> u32 {
	1_000
}

fn default_keep_failed() -> u32 {
	5_000
}

fn default_concurrency() -> u32 {
	1
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_call_timeout_ms() -> u64 {
	30_000
}

fn default_sweep_interval_seconds() -> u64 {
	60
}

fn default_stale_pending_seconds() -> u64 {
	300
}

fn default_prune_interval_seconds() -> u64 {
	900
}

fn default_top_k() -> u32 {
	3
}

fn default_over_fetch_factor() -> u32 {
	4
}
