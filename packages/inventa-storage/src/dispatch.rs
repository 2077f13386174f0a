use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{DispatchJobRow, StatusCount},
};

pub const JOB_QUEUED: &str = "QUEUED";
pub const JOB_ACTIVE: &str = "ACTIVE";
pub const JOB_COMPLETED: &str = "COMPLETED";
pub const JOB_FAILED: &str = "FAILED";

const JOB_COLUMNS: &str = "\
	job_id,
	queue,
	event_id,
	disclosure_id,
	status,
	attempts,
	max_attempts,
	last_error,
	available_at,
	created_at,
	updated_at,
	finished_at";

pub async fn enqueue_job<'e, E>(
	executor: E,
	queue: &str,
	event_id: Uuid,
	disclosure_id: Uuid,
	max_attempts: i32,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let job_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO dispatch_jobs (
	job_id,
	queue,
	event_id,
	disclosure_id,
	status,
	attempts,
	max_attempts,
	available_at,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,'QUEUED',0,$5,$6,$6,$6)",
	)
	.bind(job_id)
	.bind(queue)
	.bind(event_id)
	.bind(disclosure_id)
	.bind(max_attempts)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(job_id)
}

pub async fn fetch_job<'e, E>(executor: E, job_id: Uuid) -> Result<Option<DispatchJobRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {JOB_COLUMNS} FROM dispatch_jobs WHERE job_id = $1");
	let row = sqlx::query_as::<_, DispatchJobRow>(&sql).bind(job_id).fetch_optional(executor).await?;

	Ok(row)
}

pub async fn jobs_for_event<'e, E>(executor: E, event_id: Uuid) -> Result<Vec<DispatchJobRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {JOB_COLUMNS} FROM dispatch_jobs WHERE event_id = $1 ORDER BY created_at ASC"
	);
	let rows = sqlx::query_as::<_, DispatchJobRow>(&sql).bind(event_id).fetch_all(executor).await?;

	Ok(rows)
}

/// Claims the oldest due job of `queue` and leases it until `now + lease_seconds`.
///
/// Active jobs whose lease has run out are due again. The returned row already carries the
/// incremented attempt count.
pub async fn claim_next_job(
	db: &Db,
	queue: &str,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<DispatchJobRow>> {
	let mut tx = db.pool.begin().await?;
	let sql = format!(
		"\
SELECT {JOB_COLUMNS}
FROM dispatch_jobs
WHERE queue = $1
	AND status IN ('QUEUED','ACTIVE')
	AND available_at <= $2
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED"
	);
	let row = sqlx::query_as::<_, DispatchJobRow>(&sql)
		.bind(queue)
		.bind(now)
		.fetch_optional(&mut *tx)
		.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"\
UPDATE dispatch_jobs
SET status = 'ACTIVE',
	attempts = attempts + 1,
	available_at = $1,
	updated_at = $2
WHERE job_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.job_id)
		.execute(&mut *tx)
		.await?;

		job.status = JOB_ACTIVE.to_string();
		job.attempts += 1;
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

/// Extends the lease of a job that is still held by the delivery counted as `attempts`.
///
/// The lease never moves backwards. Returns `false` once the job was reclaimed or settled.
pub async fn renew_lease(
	db: &Db,
	job_id: Uuid,
	attempts: i32,
	lease_until: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE dispatch_jobs
SET available_at = GREATEST(available_at, $1),
	updated_at = $2
WHERE job_id = $3 AND status = 'ACTIVE' AND attempts = $4",
	)
	.bind(lease_until)
	.bind(now)
	.bind(job_id)
	.bind(attempts)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Settles an active job as `COMPLETED` or `FAILED`.
///
/// Only the delivery counted as `attempts` may settle the job. Returns `false` when the lease
/// was lost to a later delivery or the job is already settled.
pub async fn finish_job<'e, E>(
	executor: E,
	job_id: Uuid,
	attempts: i32,
	status: &str,
	error_text: Option<&str>,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE dispatch_jobs
SET status = $1,
	last_error = COALESCE($2, last_error),
	updated_at = $3,
	finished_at = $3
WHERE job_id = $4 AND status = 'ACTIVE' AND attempts = $5",
	)
	.bind(status)
	.bind(error_text)
	.bind(now)
	.bind(job_id)
	.bind(attempts)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Returns an active job to the queue for another attempt at `available_at`.
pub async fn reschedule_job(
	db: &Db,
	job_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE dispatch_jobs
SET status = 'QUEUED',
	last_error = $1,
	available_at = $2,
	updated_at = $3
WHERE job_id = $4 AND status = 'ACTIVE' AND attempts = $5",
	)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.bind(attempts)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// Whether `event_id` has a queued or active job on `queue`.
pub async fn has_live_job<'e, E>(executor: E, queue: &str, event_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let live = sqlx::query_scalar::<_, bool>(
		"\
SELECT EXISTS (
	SELECT 1
	FROM dispatch_jobs
	WHERE event_id = $1 AND queue = $2 AND status IN ('QUEUED','ACTIVE')
)",
	)
	.bind(event_id)
	.bind(queue)
	.fetch_one(executor)
	.await?;

	Ok(live)
}

/// Deletes finished jobs of `status` beyond the newest `keep`. Returns the number removed.
pub async fn prune_jobs(db: &Db, queue: &str, status: &str, keep: i64) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM dispatch_jobs
WHERE job_id IN (
	SELECT job_id
	FROM dispatch_jobs
	WHERE queue = $1 AND status = $2
	ORDER BY finished_at DESC NULLS LAST, created_at DESC
	OFFSET $3
)",
	)
	.bind(queue)
	.bind(status)
	.bind(keep.max(0))
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn job_status_counts<'e, E>(executor: E, queue: &str) -> Result<Vec<StatusCount>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, StatusCount>(
		"\
SELECT status, COUNT(*) AS count
FROM dispatch_jobs
WHERE queue = $1
GROUP BY status
ORDER BY status",
	)
	.bind(queue)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
