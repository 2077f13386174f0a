pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Index error: {message}")]
	Index { message: String },
	#[error("{operation} exceeded its {timeout_ms} ms deadline.")]
	Timeout { operation: &'static str, timeout_ms: u64 },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<inventa_storage::Error> for Error {
	fn from(err: inventa_storage::Error) -> Self {
		match err {
			inventa_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			inventa_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			inventa_storage::Error::NotFound(message) => Self::NotFound { message },
			inventa_storage::Error::Conflict(message) => Self::Conflict { message },
			err @ inventa_storage::Error::Qdrant { .. } => Self::Index { message: err.to_string() },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<inventa_domain::validate::ValidationError> for Error {
	fn from(err: inventa_domain::validate::ValidationError) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
