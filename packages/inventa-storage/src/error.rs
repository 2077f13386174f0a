#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Qdrant {operation} on {collection} failed: {source}")]
	Qdrant {
		operation: &'static str,
		collection: String,
		#[source]
		source: Box<qdrant_client::QdrantError>,
	},
}
impl Error {
	pub fn qdrant(
		operation: &'static str,
		collection: impl Into<String>,
		source: qdrant_client::QdrantError,
	) -> Self {
		Self::Qdrant { operation, collection: collection.into(), source: Box::new(source) }
	}
}
