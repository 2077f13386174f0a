use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DISCLOSURE_TOPIC: &str = "disclosure_event";
pub const DISCLOSURE_CREATED: &str = "disclosure_created";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
	#[error("Unknown event name {0:?}.")]
	UnknownName(String),
	#[error("Unknown event status {0:?}.")]
	UnknownStatus(String),
	#[error("Malformed {name} payload: {source}")]
	Payload { name: String, source: serde_json::Error },
}

/// Lifecycle of an outbox event row.
///
/// `pending` is written by the producer. A worker moves the row to `processing` under its row
/// lock and then to `completed` or `failed`. `failed` is re-entered on every redelivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
	Pending,
	Processing,
	Completed,
	Failed,
}
impl EventStatus {
	pub const ALL: [Self; 4] = [Self::Pending, Self::Processing, Self::Completed, Self::Failed];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}

impl fmt::Display for EventStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EventStatus {
	type Err = DecodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| DecodeError::UnknownStatus(s.to_string()))
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosureCreated {
	pub disclosure_id: Uuid,
	pub docket_number: i64,
	pub title: String,
}

/// Payload of an outbox event, keyed by the event name stored next to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPayload {
	DisclosureCreated(DisclosureCreated),
}
impl EventPayload {
	pub fn name(&self) -> &'static str {
		match self {
			Self::DisclosureCreated(_) => DISCLOSURE_CREATED,
		}
	}

	pub fn topic(&self) -> &'static str {
		match self {
			Self::DisclosureCreated(_) => DISCLOSURE_TOPIC,
		}
	}

	/// Correlation key stored on the event row.
	pub fn key(&self) -> String {
		match self {
			Self::DisclosureCreated(payload) => payload.disclosure_id.to_string(),
		}
	}

	pub fn disclosure_id(&self) -> Uuid {
		match self {
			Self::DisclosureCreated(payload) => payload.disclosure_id,
		}
	}

	pub fn to_json(&self) -> Value {
		match self {
			Self::DisclosureCreated(payload) => serde_json::json!({
				"disclosure_id": payload.disclosure_id,
				"docket_number": payload.docket_number,
				"title": payload.title,
			}),
		}
	}

	pub fn decode(name: &str, payload: Value) -> Result<Self, DecodeError> {
		match name {
			DISCLOSURE_CREATED => serde_json::from_value(payload)
				.map(Self::DisclosureCreated)
				.map_err(|source| DecodeError::Payload { name: name.to_string(), source }),
			other => Err(DecodeError::UnknownName(other.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_round_trips_through_text() {
		for status in EventStatus::ALL {
			assert_eq!(status.as_str().parse::<EventStatus>().expect("parse failed"), status);
		}

		assert!("done".parse::<EventStatus>().is_err());
	}

	#[test]
	fn unknown_event_name_is_rejected() {
		let err = EventPayload::decode("disclosure_deleted", serde_json::json!({}))
			.expect_err("Expected unknown name.");

		assert!(matches!(err, DecodeError::UnknownName(name) if name == "disclosure_deleted"));
	}
}
