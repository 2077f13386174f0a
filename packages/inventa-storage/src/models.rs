use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DisclosureRow {
	pub disclosure_id: Uuid,
	pub docket_number: i64,
	pub title: String,
	pub description: String,
	pub key_differences: Value,
	pub inventors: Value,
	pub uri: Option<String>,
	pub raw_extraction: Option<Value>,
	pub public_planned: bool,
	pub public_venue: Option<String>,
	pub public_date: Option<Date>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Column values of a new disclosure. The docket number comes from `disclosure_docket_seq`.
#[derive(Debug)]
pub struct DisclosureInsert<'a> {
	pub disclosure_id: Uuid,
	pub title: &'a str,
	pub description: &'a str,
	pub key_differences: Value,
	pub inventors: Value,
	pub uri: Option<&'a str>,
	pub raw_extraction: Option<Value>,
	pub public_planned: bool,
	pub public_venue: Option<&'a str>,
	pub public_date: Option<Date>,
	pub now: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct EventRow {
	pub event_id: Uuid,
	pub topic: String,
	pub name: String,
	pub key: String,
	pub payload: Value,
	pub status: String,
	pub attempt_count: i32,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DispatchJobRow {
	pub job_id: Uuid,
	pub queue: String,
	pub event_id: Uuid,
	pub disclosure_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub max_attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub finished_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct StatusCount {
	pub status: String,
	pub count: i64,
}
