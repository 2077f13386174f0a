use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::disclosure::Disclosure;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
	Title,
	Description,
	KeyDifference,
}
impl ChunkType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Title => "title",
			Self::Description => "description",
			Self::KeyDifference => "key_difference",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"title" => Some(Self::Title),
			"description" => Some(Self::Description),
			"key_difference" => Some(Self::KeyDifference),
			_ => None,
		}
	}

	/// Segment used inside chunk identifiers.
	fn id_segment(self) -> &'static str {
		match self {
			Self::Title => "title",
			Self::Description => "description",
			Self::KeyDifference => "kd",
		}
	}
}

impl fmt::Display for ChunkType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Metadata published next to every vector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
	#[serde(rename = "type")]
	pub chunk_type: ChunkType,
	pub disclosure_id: Uuid,
	pub docket_number: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ordinal: Option<u32>,
}

/// One embeddable fragment of a disclosure.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
	pub id: String,
	pub text: String,
	pub metadata: ChunkMetadata,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorRecord {
	pub id: String,
	pub values: Vec<f32>,
	pub metadata: ChunkMetadata,
}

/// Deterministic identifier `{disclosure_id}:{type}[:ordinal]`.
///
/// Re-publishing a chunk under the same identifier overwrites the previous vector, which is what
/// makes redelivered events safe.
pub fn chunk_id(disclosure_id: Uuid, chunk_type: ChunkType, ordinal: Option<u32>) -> String {
	match ordinal {
		Some(ordinal) => format!("{disclosure_id}:{}:{ordinal}", chunk_type.id_segment()),
		None => format!("{disclosure_id}:{}", chunk_type.id_segment()),
	}
}

/// Title, description, then one chunk per key difference in stored order.
pub fn chunks_for(disclosure: &Disclosure) -> Vec<Chunk> {
	let mut chunks = Vec::with_capacity(disclosure.key_differences.len() + 2);
	let chunk = |chunk_type: ChunkType, ordinal: Option<u32>, text: &str| Chunk {
		id: chunk_id(disclosure.id, chunk_type, ordinal),
		text: text.to_string(),
		metadata: ChunkMetadata {
			chunk_type,
			disclosure_id: disclosure.id,
			docket_number: disclosure.docket_number,
			ordinal,
		},
	};

	chunks.push(chunk(ChunkType::Title, None, &disclosure.title));
	chunks.push(chunk(ChunkType::Description, None, &disclosure.description));

	for key_difference in &disclosure.key_differences {
		chunks.push(chunk(
			ChunkType::KeyDifference,
			Some(key_difference.ordinal),
			&key_difference.statement_md,
		));
	}

	chunks
}
