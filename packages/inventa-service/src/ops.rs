use std::collections::BTreeMap;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use inventa_domain::event::{EventPayload, EventStatus};
use inventa_storage::{dispatch, events, models::StatusCount};

use crate::{Error, InventaService, Result};

const RECENT_FAILURES_LIMIT: i64 = 20;
const SWEEP_BATCH_LIMIT: i64 = 500;

#[derive(Clone, Debug, Serialize)]
pub struct EventReport {
	pub events: BTreeMap<String, i64>,
	pub jobs: BTreeMap<String, i64>,
	pub recent_failures: Vec<FailedEvent>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FailedEvent {
	pub event_id: Uuid,
	pub key: String,
	pub attempt_count: i32,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	pub last_error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
	pub requeued: Vec<Uuid>,
	pub skipped: Vec<Uuid>,
}

impl InventaService {
	/// Per-status event and job counts plus the most recently failed events.
	pub async fn event_report(&self) -> Result<EventReport> {
		let mut event_counts = counts_by_status(events::event_status_counts(&self.db.pool).await?);

		for status in EventStatus::ALL {
			event_counts.entry(status.as_str().to_string()).or_insert(0);
		}

		let jobs = counts_by_status(
			dispatch::job_status_counts(&self.db.pool, self.dispatcher.queue()).await?,
		);
		let failed = events::list_events_by_status(
			&self.db.pool,
			EventStatus::Failed.as_str(),
			RECENT_FAILURES_LIMIT,
		)
		.await?;
		let mut recent_failures = Vec::with_capacity(failed.len());

		for event in failed {
			let last_error = dispatch::jobs_for_event(&self.db.pool, event.event_id)
				.await?
				.into_iter()
				.rev()
				.find_map(|job| job.last_error);

			recent_failures.push(FailedEvent {
				event_id: event.event_id,
				key: event.key,
				attempt_count: event.attempt_count,
				updated_at: event.updated_at,
				last_error,
			});
		}

		Ok(EventReport { events: event_counts, jobs, recent_failures })
	}

	/// Submits a job for every pending event that has been waiting longer than
	/// `worker.stale_pending_seconds` without a queued or active job.
	pub async fn requeue_stale_pending(&self, now: OffsetDateTime) -> Result<SweepReport> {
		let stale_after =
			Duration::seconds(i64::try_from(self.cfg.worker.stale_pending_seconds).unwrap_or(i64::MAX));
		let stale = events::stale_pending_events(
			&self.db.pool,
			self.dispatcher.queue(),
			now - stale_after,
			SWEEP_BATCH_LIMIT,
		)
		.await?;
		let mut report = SweepReport::default();

		for event in stale {
			let payload = match EventPayload::decode(&event.name, event.payload) {
				Ok(payload) => payload,
				Err(err) => {
					tracing::warn!(
						event_id = %event.event_id,
						error = %err,
						"Stale pending event has an undecodable payload. Skipping."
					);

					report.skipped.push(event.event_id);

					continue;
				},
			};

			self.dispatcher.submit(event.event_id, payload.disclosure_id()).await?;

			report.requeued.push(event.event_id);
		}

		if !report.requeued.is_empty() || !report.skipped.is_empty() {
			tracing::info!(
				requeued = report.requeued.len(),
				skipped = report.skipped.len(),
				"Stale pending sweep finished."
			);
		}

		Ok(report)
	}

	/// Puts a failed event back to `pending` and submits a fresh job for it.
	///
	/// The event row stays locked while its status and live jobs are checked and the new job is
	/// written, so two concurrent requests cannot both resubmit it.
	pub async fn reprocess_event(&self, event_id: Uuid) -> Result<Uuid> {
		let mut tx = self.db.pool.begin().await?;
		let Some(event) = events::claim_event_tx(&mut tx, event_id).await? else {
			tx.rollback().await?;

			return match events::fetch_event(&self.db.pool, event_id).await? {
				Some(_) => Err(Error::Conflict {
					message: format!("Event {event_id} is locked by a worker or another request."),
				}),
				None => Err(Error::NotFound { message: format!("Event {event_id}.") }),
			};
		};
		let status = event
			.status
			.parse::<EventStatus>()
			.map_err(|err| Error::Storage { message: err.to_string() })?;

		if matches!(status, EventStatus::Completed | EventStatus::Processing) {
			return Err(Error::Conflict {
				message: format!("Event {event_id} is {status} and cannot be reprocessed."),
			});
		}
		if dispatch::has_live_job(&mut *tx, self.dispatcher.queue(), event_id).await? {
			return Err(Error::Conflict {
				message: format!("Event {event_id} already has a queued or active job."),
			});
		}

		let payload = EventPayload::decode(&event.name, event.payload)
			.map_err(|err| Error::InvalidRequest { message: err.to_string() })?;

		events::mark_event_status(
			&mut *tx,
			event_id,
			EventStatus::Pending.as_str(),
			OffsetDateTime::now_utc(),
		)
		.await?;

		let job_id = self.dispatcher.submit_with(&mut *tx, event_id, payload.disclosure_id()).await?;

		tx.commit().await?;

		tracing::info!(%event_id, %job_id, previous_status = %status, "Event resubmitted.");

		Ok(job_id)
	}
}

fn counts_by_status(rows: Vec<StatusCount>) -> BTreeMap<String, i64> {
	rows.into_iter().map(|row| (row.status, row.count)).collect()
}
