use sqlx::{PgExecutor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{EventRow, StatusCount},
};

const EVENT_COLUMNS: &str = "\
	event_id,
	topic,
	name,
	key,
	payload,
	status,
	attempt_count,
	created_at,
	updated_at";

#[derive(Debug)]
pub struct EventInsert<'a> {
	pub event_id: Uuid,
	pub topic: &'a str,
	pub name: &'a str,
	pub key: &'a str,
	pub payload: &'a serde_json::Value,
	pub now: OffsetDateTime,
}

pub async fn insert_event<'e, E>(executor: E, event: &EventInsert<'_>) -> Result<EventRow>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO events (event_id, topic, name, key, payload, status, attempt_count, created_at, updated_at)
VALUES ($1,$2,$3,$4,$5,'pending',0,$6,$6)
RETURNING {EVENT_COLUMNS}"
	);
	let row = sqlx::query_as::<_, EventRow>(&sql)
		.bind(event.event_id)
		.bind(event.topic)
		.bind(event.name)
		.bind(event.key)
		.bind(event.payload)
		.bind(event.now)
		.fetch_one(executor)
		.await?;

	Ok(row)
}

pub async fn fetch_event<'e, E>(executor: E, event_id: Uuid) -> Result<Option<EventRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = $1");
	let row = sqlx::query_as::<_, EventRow>(&sql).bind(event_id).fetch_optional(executor).await?;

	Ok(row)
}

/// Locks the event row for the lifetime of `tx`.
///
/// Returns `None` when the row does not exist or another transaction already holds it, so a
/// concurrent redelivery of the same event never waits on the first consumer.
pub async fn claim_event_tx(
	tx: &mut Transaction<'_, Postgres>,
	event_id: Uuid,
) -> Result<Option<EventRow>> {
	let sql = format!(
		"\
SELECT {EVENT_COLUMNS}
FROM events
WHERE event_id = $1
FOR UPDATE SKIP LOCKED"
	);
	let row = sqlx::query_as::<_, EventRow>(&sql).bind(event_id).fetch_optional(&mut **tx).await?;

	Ok(row)
}

pub async fn mark_event_status<'e, E>(
	executor: E,
	event_id: Uuid,
	status: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("UPDATE events SET status = $1, updated_at = $2 WHERE event_id = $3")
		.bind(status)
		.bind(now)
		.bind(event_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

/// Records one exhausted delivery and marks the event `failed`.
///
/// A `completed` event is left untouched: its vectors are already published, whichever delivery
/// published them. Returns `false` in that case.
pub async fn fail_exhausted_event<'e, E>(
	executor: E,
	event_id: Uuid,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE events
SET status = 'failed',
	attempt_count = attempt_count + 1,
	updated_at = $1
WHERE event_id = $2 AND status <> 'completed'",
	)
	.bind(now)
	.bind(event_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Pending events older than `older_than` with no queued or active dispatch job.
pub async fn stale_pending_events<'e, E>(
	executor: E,
	queue: &str,
	older_than: OffsetDateTime,
	limit: i64,
) -> Result<Vec<EventRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {EVENT_COLUMNS}
FROM events e
WHERE e.status = 'pending'
	AND e.updated_at <= $1
	AND NOT EXISTS (
		SELECT 1
		FROM dispatch_jobs j
		WHERE j.event_id = e.event_id
			AND j.queue = $2
			AND j.status IN ('QUEUED','ACTIVE')
	)
ORDER BY e.created_at ASC
LIMIT $3"
	);
	let rows = sqlx::query_as::<_, EventRow>(&sql)
		.bind(older_than)
		.bind(queue)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

pub async fn event_status_counts<'e, E>(executor: E) -> Result<Vec<StatusCount>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, StatusCount>(
		"SELECT status, COUNT(*) AS count FROM events GROUP BY status ORDER BY status",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_events_by_status<'e, E>(
	executor: E,
	status: &str,
	limit: i64,
) -> Result<Vec<EventRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
SELECT {EVENT_COLUMNS}
FROM events
WHERE status = $1
ORDER BY updated_at DESC
LIMIT $2"
	);
	let rows =
		sqlx::query_as::<_, EventRow>(&sql).bind(status).bind(limit).fetch_all(executor).await?;

	Ok(rows)
}
