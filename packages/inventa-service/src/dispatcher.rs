//! Durable at-least-once delivery of `(event_id, disclosure_id)` jobs.
//!
//! Jobs live in `dispatch_jobs`. A claim leases the job and counts one delivery attempt. A failed
//! delivery goes back to the queue with exponential backoff until `max_attempts` is spent, after
//! which the job is parked as `FAILED` and the event it carries is marked failed for manual
//! reprocessing. The dispatcher never looks at event state beyond that exhaustion hook.
//!
//! Every job transition is fenced on the delivery that claimed it (`status = 'ACTIVE'` and the
//! attempt count), so a worker whose lease was taken over cannot settle the job afterwards.

use std::{convert::Infallible, time::Duration as StdDuration};

use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use inventa_storage::{
	db::Db,
	dispatch::{self, JOB_COMPLETED, JOB_FAILED},
	events,
	models::DispatchJobRow,
};

use crate::Result;

const MAX_ERROR_CHARS: usize = 1_024;
const MAX_BACKOFF_EXPONENT: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub backoff_base_ms: i64,
	pub backoff_max_ms: i64,
}
impl RetryPolicy {
	pub fn from_config(cfg: &inventa_config::Dispatcher) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			backoff_base_ms: i64::try_from(cfg.backoff_base_ms).unwrap_or(i64::MAX),
			backoff_max_ms: i64::try_from(cfg.backoff_max_ms).unwrap_or(i64::MAX),
		}
	}

	/// Delay before redelivering a job whose `attempt`-th delivery failed.
	pub fn backoff_for_attempt(&self, attempt: i32) -> Duration {
		let attempts = attempt.max(1) as u32;
		let exp = attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
		let delay = self.backoff_base_ms.saturating_mul(1_i64 << exp);

		Duration::milliseconds(delay.min(self.backoff_max_ms))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOutcome {
	Retried { available_at: OffsetDateTime },
	Exhausted,
	/// A later delivery owns the job. Nothing was recorded.
	Superseded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PruneReport {
	pub completed: u64,
	pub failed: u64,
}

pub struct Dispatcher {
	db: Db,
	queue: String,
	policy: RetryPolicy,
	lease_seconds: i64,
	keep_completed: i64,
	keep_failed: i64,
}
impl Dispatcher {
	pub fn new(db: Db, cfg: &inventa_config::Dispatcher) -> Self {
		Self {
			db,
			queue: cfg.queue.clone(),
			policy: RetryPolicy::from_config(cfg),
			lease_seconds: i64::from(cfg.lease_seconds),
			keep_completed: i64::from(cfg.keep_completed),
			keep_failed: i64::from(cfg.keep_failed),
		}
	}

	pub fn queue(&self) -> &str {
		&self.queue
	}

	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}

	pub async fn submit(&self, event_id: Uuid, disclosure_id: Uuid) -> Result<Uuid> {
		self.submit_with(&self.db.pool, event_id, disclosure_id).await
	}

	/// Enqueues a job through `executor`, so callers can tie the job to their own transaction.
	pub async fn submit_with<'e, E>(
		&self,
		executor: E,
		event_id: Uuid,
		disclosure_id: Uuid,
	) -> Result<Uuid>
	where
		E: PgExecutor<'e>,
	{
		let now = OffsetDateTime::now_utc();
		let job_id = dispatch::enqueue_job(
			executor,
			&self.queue,
			event_id,
			disclosure_id,
			self.policy.max_attempts as i32,
			now,
		)
		.await?;

		tracing::debug!(%job_id, %event_id, %disclosure_id, "Dispatch job submitted.");

		Ok(job_id)
	}

	/// Claims the next due job.
	///
	/// A job whose lease expired after its final attempt is exhausted here instead of being
	/// delivered again.
	pub async fn claim(&self, now: OffsetDateTime) -> Result<Option<DispatchJobRow>> {
		loop {
			let Some(job) =
				dispatch::claim_next_job(&self.db, &self.queue, now, self.lease_seconds).await?
			else {
				return Ok(None);
			};

			if job.attempts > job.max_attempts {
				self.exhaust(&job, "Lease expired after the final delivery attempt.", now).await?;

				continue;
			}

			tracing::info!(
				job_id = %job.job_id,
				event_id = %job.event_id,
				attempt = job.attempts,
				"Dispatch job claimed."
			);

			return Ok(Some(job));
		}
	}

	/// Marks the job completed. Returns `false` when a later delivery had already taken it over.
	pub async fn complete(&self, job: &DispatchJobRow) -> Result<bool> {
		let settled = dispatch::finish_job(
			&self.db.pool,
			job.job_id,
			job.attempts,
			JOB_COMPLETED,
			None,
			OffsetDateTime::now_utc(),
		)
		.await?;

		if !settled {
			tracing::warn!(
				job_id = %job.job_id,
				attempt = job.attempts,
				"Dispatch job lease was lost before completion."
			);
		}

		Ok(settled)
	}

	/// Records a failed delivery and decides between redelivery and exhaustion.
	pub async fn fail(&self, job: &DispatchJobRow, error: &str) -> Result<FailOutcome> {
		let now = OffsetDateTime::now_utc();

		if job.attempts >= job.max_attempts {
			return Ok(if self.exhaust(job, error, now).await? {
				FailOutcome::Exhausted
			} else {
				FailOutcome::Superseded
			});
		}

		let available_at = now + self.policy.backoff_for_attempt(job.attempts);
		let error_text = sanitize_error(error);

		if !dispatch::reschedule_job(
			&self.db,
			job.job_id,
			job.attempts,
			&error_text,
			available_at,
			now,
		)
		.await?
		{
			tracing::warn!(
				job_id = %job.job_id,
				attempt = job.attempts,
				"Dispatch job lease was lost before the failure was recorded."
			);

			return Ok(FailOutcome::Superseded);
		}

		tracing::warn!(
			job_id = %job.job_id,
			event_id = %job.event_id,
			attempt = job.attempts,
			max_attempts = job.max_attempts,
			%available_at,
			"Dispatch job will be retried."
		);

		Ok(FailOutcome::Retried { available_at })
	}

	/// Pushes the lease of an in-flight job forward. Returns `false` once the job is no longer
	/// held by this delivery.
	pub async fn renew(&self, job: &DispatchJobRow) -> Result<bool> {
		let now = OffsetDateTime::now_utc();

		dispatch::renew_lease(
			&self.db,
			job.job_id,
			job.attempts,
			now + Duration::seconds(self.lease_seconds),
			now,
		)
		.await
		.map_err(Into::into)
	}

	/// Renews the lease of `job` every third of the lease period for as long as it is polled.
	///
	/// Never resolves. Race it against the job's work and drop it when the work ends.
	pub async fn keep_leased(&self, job: &DispatchJobRow) -> Infallible {
		let period =
			StdDuration::from_secs(u64::try_from(self.lease_seconds / 3).unwrap_or(0).max(1));
		let mut held = true;

		loop {
			tokio::time::sleep(period).await;

			if !held {
				continue;
			}

			match self.renew(job).await {
				Ok(true) => {},
				Ok(false) => {
					held = false;

					tracing::warn!(job_id = %job.job_id, "Dispatch job lease could not be renewed.");
				},
				Err(err) => {
					tracing::warn!(job_id = %job.job_id, error = %err, "Lease renewal failed.");
				},
			}
		}
	}

	/// Drops finished jobs beyond the retention bounds.
	pub async fn prune(&self) -> Result<PruneReport> {
		let completed =
			dispatch::prune_jobs(&self.db, &self.queue, JOB_COMPLETED, self.keep_completed).await?;
		let failed = dispatch::prune_jobs(&self.db, &self.queue, JOB_FAILED, self.keep_failed).await?;

		Ok(PruneReport { completed, failed })
	}

	/// Settles a job that ran out of deliveries. Returns `false` when this delivery no longer
	/// owns the job.
	///
	/// The event is failed and its attempt counter bumped unless some delivery already completed
	/// it, in which case the job is settled as completed instead.
	async fn exhaust(&self, job: &DispatchJobRow, error: &str, now: OffsetDateTime) -> Result<bool> {
		let error_text = sanitize_error(error);
		let mut tx = self.db.pool.begin().await?;
		let event_failed = events::fail_exhausted_event(&mut *tx, job.event_id, now).await?;
		let status = if event_failed { JOB_FAILED } else { JOB_COMPLETED };
		let settled = dispatch::finish_job(
			&mut *tx,
			job.job_id,
			job.attempts,
			status,
			Some(error_text.as_str()),
			now,
		)
		.await?;

		if !settled {
			tx.rollback().await?;

			tracing::warn!(
				job_id = %job.job_id,
				attempt = job.attempts,
				"Dispatch job was taken over before it could be exhausted."
			);

			return Ok(false);
		}

		tx.commit().await?;

		if event_failed {
			tracing::error!(
				job_id = %job.job_id,
				event_id = %job.event_id,
				attempts = job.attempts,
				error = %error_text,
				"Dispatch job exhausted its delivery attempts."
			);
		} else {
			tracing::info!(
				job_id = %job.job_id,
				event_id = %job.event_id,
				"Event was already completed. Exhausted job settled as completed."
			);
		}

		Ok(true)
	}
}

/// Redacts credentials and bounds the length of error text persisted with a job.
pub fn sanitize_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_ERROR_CHARS {
		out = out.chars().take(MAX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
