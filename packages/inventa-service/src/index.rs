//! Qdrant as the chunk vector index.
//!
//! Qdrant point ids must be integers or UUIDs, so every chunk id is mapped to a UUIDv5 and the
//! readable chunk id travels in the payload.

use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		PointStruct, Query, QueryPointsBuilder, ScoredPoint, UpsertPointsBuilder, Value,
		value::Kind,
	},
};
use uuid::Uuid;

use inventa_domain::{
	chunk::{ChunkMetadata, ChunkType, VectorRecord},
	similarity::IndexMatch,
};
use inventa_storage::qdrant::QdrantStore;

use crate::{BoxFuture, Result, VectorIndex};

pub const PAYLOAD_CHUNK_ID: &str = "chunk_id";
pub const PAYLOAD_TYPE: &str = "type";
pub const PAYLOAD_DISCLOSURE_ID: &str = "disclosure_id";
pub const PAYLOAD_DOCKET_NUMBER: &str = "docket_number";
pub const PAYLOAD_ORDINAL: &str = "ordinal";

impl VectorIndex for QdrantStore {
	fn initialize(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			self.create_collection_if_missing().await?;

			if !self.wait_until_green().await {
				tracing::warn!(
					collection = %self.collection,
					attempts = self.ready_poll_attempts,
					"Qdrant collection is not green after polling. Continuing."
				);
			}

			Ok(())
		})
	}

	fn upsert<'a>(&'a self, records: &'a [VectorRecord]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let points = records.iter().map(point_for).collect::<Vec<_>>();
			let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

			self.client.upsert_points(upsert).await.map_err(|err| {
				inventa_storage::Error::qdrant("upsert_points", &self.collection, err)
			})?;

			tracing::debug!(collection = %self.collection, count = records.len(), "Upserted chunk vectors.");

			Ok(())
		})
	}

	fn query<'a>(&'a self, vector: &'a [f32], top_k: u32) -> BoxFuture<'a, Result<Vec<IndexMatch>>> {
		Box::pin(async move {
			let search = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(vector.to_vec()))
				.limit(top_k as u64)
				.with_payload(true);
			let response = self.client.query(search).await.map_err(|err| {
				inventa_storage::Error::qdrant("query", &self.collection, err)
			})?;

			Ok(response.result.iter().map(match_for).collect())
		})
	}
}

/// Deterministic Qdrant point id of a chunk.
pub fn point_id(chunk_id: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes())
}

fn point_for(record: &VectorRecord) -> PointStruct {
	let metadata = &record.metadata;
	let mut payload = HashMap::new();

	payload.insert(PAYLOAD_CHUNK_ID.to_string(), Value::from(record.id.clone()));
	payload.insert(PAYLOAD_TYPE.to_string(), Value::from(metadata.chunk_type.as_str().to_string()));
	payload.insert(
		PAYLOAD_DISCLOSURE_ID.to_string(),
		Value::from(metadata.disclosure_id.to_string()),
	);
	payload.insert(PAYLOAD_DOCKET_NUMBER.to_string(), Value::from(metadata.docket_number));

	if let Some(ordinal) = metadata.ordinal {
		payload.insert(PAYLOAD_ORDINAL.to_string(), Value::from(i64::from(ordinal)));
	}

	PointStruct::new(
		point_id(&record.id).to_string(),
		record.values.clone(),
		Payload::from(payload),
	)
}

fn match_for(point: &ScoredPoint) -> IndexMatch {
	let payload = &point.payload;
	let id = payload_string(payload, PAYLOAD_CHUNK_ID).unwrap_or_default();

	IndexMatch { id, score: point.score, metadata: metadata_from_payload(payload) }
}

fn metadata_from_payload(payload: &HashMap<String, Value>) -> Option<ChunkMetadata> {
	let chunk_type = ChunkType::parse(payload_string(payload, PAYLOAD_TYPE)?.as_str())?;
	let disclosure_id = payload_uuid(payload, PAYLOAD_DISCLOSURE_ID)?;
	let docket_number = payload_i64(payload, PAYLOAD_DOCKET_NUMBER)?;
	let ordinal = payload_i64(payload, PAYLOAD_ORDINAL).and_then(|value| u32::try_from(value).ok());

	Some(ChunkMetadata { chunk_type, disclosure_id, docket_number, ordinal })
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_uuid(payload: &HashMap<String, Value>, key: &str) -> Option<Uuid> {
	Uuid::parse_str(payload_string(payload, key)?.as_str()).ok()
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				Some(*value as i64)
			} else {
				None
			},
		_ => None,
	}
}
