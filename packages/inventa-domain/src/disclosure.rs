use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
	pub page: u32,
	pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contrast {
	pub prior_art: String,
	pub our_approach: String,
	pub why_it_matters: String,
}

/// One claimed difference from prior art. `ordinal` is 1-based and fixes the chunk identity of
/// the statement once it has been published to the index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDifference {
	pub ordinal: u32,
	pub statement_md: String,
	#[serde(default)]
	pub contrast: Contrast,
	#[serde(default)]
	pub evidence_spans: Vec<EvidenceSpan>,
	pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inventor {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub affiliation: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceScores {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key_diffs: Option<f32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inventors: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionEvidence {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<Vec<EvidenceSpan>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<Vec<EvidenceSpan>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key_diffs: Option<Vec<EvidenceSpan>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inventors: Option<Vec<EvidenceSpan>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deadline {
	pub label: String,
	pub date: String,
}

/// Snapshot of what the document extractor produced before a human edited the record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExtraction {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extraction_data: Option<Vec<KeyDifference>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub confidence_scores: Option<ConfidenceScores>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub evidence: Option<ExtractionEvidence>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deadline: Option<Deadline>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclosure {
	pub id: Uuid,
	pub docket_number: i64,
	pub title: String,
	pub description: String,
	pub key_differences: Vec<KeyDifference>,
	pub inventors: Vec<Inventor>,
	pub uri: Option<String>,
	pub raw_extraction: Option<RawExtraction>,
	pub public_planned: bool,
	pub public_venue: Option<String>,
	pub public_date: Option<Date>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}

/// Input of the create path. Identity, docket number, and timestamps are assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDisclosure {
	pub title: String,
	pub description: String,
	pub key_differences: Vec<KeyDifference>,
	pub inventors: Vec<Inventor>,
	#[serde(default)]
	pub uri: Option<String>,
	#[serde(default)]
	pub raw_extraction: Option<RawExtraction>,
	#[serde(default)]
	pub public_planned: bool,
	#[serde(default)]
	pub public_venue: Option<String>,
	#[serde(default)]
	pub public_date: Option<Date>,
}
