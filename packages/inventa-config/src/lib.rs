mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Dispatcher, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Service, Similarity,
	Storage, Worker,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } => {
			Error::ParseConfig { path: path.to_path_buf(), source }
		},
		other => other,
	})
}

/// Parses, normalizes, and validates an in-memory TOML document.
pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.ready_poll_attempts == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.ready_poll_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.dispatcher.queue.trim().is_empty() {
		return Err(Error::Validation {
			message: "dispatcher.queue must be non-empty.".to_string(),
		});
	}
	if cfg.dispatcher.max_attempts == 0 {
		return Err(Error::Validation {
			message: "dispatcher.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.dispatcher.backoff_base_ms == 0 {
		return Err(Error::Validation {
			message: "dispatcher.backoff_base_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.dispatcher.backoff_max_ms < cfg.dispatcher.backoff_base_ms {
		return Err(Error::Validation {
			message: "dispatcher.backoff_max_ms must be at least dispatcher.backoff_base_ms."
				.to_string(),
		});
	}
	if cfg.dispatcher.lease_seconds == 0 {
		return Err(Error::Validation {
			message: "dispatcher.lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.concurrency == 0 {
		return Err(Error::Validation {
			message: "worker.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.call_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "worker.call_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.similarity.default_top_k == 0 {
		return Err(Error::Validation {
			message: "similarity.default_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.similarity.over_fetch_factor == 0 {
		return Err(Error::Validation {
			message: "similarity.over_fetch_factor must be at least 1.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.providers.embedding.path.trim().is_empty() {
		cfg.providers.embedding.path = types::default_embedding_path();
	}

	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
