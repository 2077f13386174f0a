use std::{future::Future, sync::Arc, time::Duration};

use color_eyre::Result;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use tokio::{
	sync::watch,
	time::{self as tokio_time, MissedTickBehavior},
};
use uuid::Uuid;

use inventa_domain::{
	chunk::{self, VectorRecord},
	event::EventStatus,
};
use inventa_service::{FailOutcome, InventaService, records};
use inventa_storage::{disclosures, events, models::DispatchJobRow};

/// How a claimed event ended when no error was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
	/// Vectors were published and the event is `completed`.
	Completed { vectors: usize },
	/// The referenced disclosure is gone. The event is `failed` and retrying cannot help.
	Missing,
	/// Another worker holds the event row.
	Skipped,
}

#[derive(Clone)]
pub struct WorkerState {
	pub service: Arc<InventaService>,
}

/// Runs the job loops and the maintenance loop until ctrl-c.
pub async fn run_worker(state: WorkerState) -> Result<()> {
	run_until(state, async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "Failed to listen for the shutdown signal.");
		}
	})
	.await
}

pub async fn run_until<F>(state: WorkerState, shutdown: F) -> Result<()>
where
	F: Future<Output = ()>,
{
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let concurrency = state.service.cfg.worker.concurrency.max(1);
	let mut handles = Vec::with_capacity(concurrency as usize + 1);

	for worker_index in 0..concurrency {
		handles.push(tokio::spawn(job_loop(state.clone(), worker_index, shutdown_rx.clone())));
	}

	handles.push(tokio::spawn(maintenance_loop(state.clone(), shutdown_rx)));

	shutdown.await;

	tracing::info!("Shutdown requested. Waiting for in-flight jobs.");

	let _ = shutdown_tx.send(true);

	for handle in handles {
		handle.await?;
	}

	Ok(())
}

/// Claims and handles one due job. Returns `false` when the queue had nothing due.
pub async fn process_next_job(service: &InventaService) -> Result<bool> {
	let Some(job) = service.dispatcher.claim(OffsetDateTime::now_utc()).await? else {
		return Ok(false);
	};

	handle_job(service, &job).await?;

	Ok(true)
}

/// Runs the event state machine for one delivery and reports the result to the dispatcher.
///
/// The job lease is renewed while the event is being processed.
pub async fn handle_job(service: &InventaService, job: &DispatchJobRow) -> Result<()> {
	let result = tokio::select! {
		result = process_event(service, job.event_id, job.disclosure_id) => result,
		never = service.dispatcher.keep_leased(job) => match never {},
	};

	match result {
		Ok(outcome) => {
			if service.dispatcher.complete(job).await? {
				tracing::info!(
					job_id = %job.job_id,
					event_id = %job.event_id,
					outcome = ?outcome,
					"Dispatch job finished."
				);
			}
		},
		Err(err) => {
			let outcome = service.dispatcher.fail(job, &err.to_string()).await?;

			if let FailOutcome::Retried { available_at } = outcome {
				tracing::warn!(
					job_id = %job.job_id,
					event_id = %job.event_id,
					error = %err,
					%available_at,
					"Event processing failed."
				);
			}
		},
	}

	Ok(())
}

/// Publishes the chunk vectors of one event's disclosure under the event row lock.
///
/// Any error after the claim rolls the transaction back, marks the event `failed` outside of it,
/// and is returned so the dispatcher can schedule a redelivery.
pub async fn process_event(
	service: &InventaService,
	event_id: Uuid,
	disclosure_id: Uuid,
) -> inventa_service::Result<EventOutcome> {
	let mut tx = service.db.pool.begin().await?;
	let Some(event) = events::claim_event_tx(&mut tx, event_id).await? else {
		tx.rollback().await?;

		tracing::debug!(%event_id, "Event is locked by another worker or missing. Skipping.");

		return Ok(EventOutcome::Skipped);
	};

	events::mark_event_status(
		&mut *tx,
		event_id,
		EventStatus::Processing.as_str(),
		OffsetDateTime::now_utc(),
	)
	.await?;

	tracing::info!(%event_id, %disclosure_id, previous_status = %event.status, "Event processing.");

	match publish_claimed(service, tx, event_id, disclosure_id).await {
		Ok(outcome) => Ok(outcome),
		Err(err) => {
			if let Err(mark_err) = events::mark_event_status(
				&service.db.pool,
				event_id,
				EventStatus::Failed.as_str(),
				OffsetDateTime::now_utc(),
			)
			.await
			{
				tracing::error!(%event_id, error = %mark_err, "Failed to mark event as failed.");
			}

			Err(err)
		},
	}
}

async fn publish_claimed(
	service: &InventaService,
	mut tx: Transaction<'static, Postgres>,
	event_id: Uuid,
	disclosure_id: Uuid,
) -> inventa_service::Result<EventOutcome> {
	let Some(row) = disclosures::fetch_disclosure(&mut *tx, disclosure_id).await? else {
		events::mark_event_status(
			&mut *tx,
			event_id,
			EventStatus::Failed.as_str(),
			OffsetDateTime::now_utc(),
		)
		.await?;
		tx.commit().await?;

		tracing::warn!(%event_id, %disclosure_id, "Disclosure no longer exists. Event failed.");

		return Ok(EventOutcome::Missing);
	};
	let disclosure = records::disclosure_from_row(row)?;
	let mut vectors = Vec::new();

	for chunk in chunk::chunks_for(&disclosure) {
		let values = service.adapter.embed(&chunk.text).await?;

		if values.is_empty() {
			tracing::debug!(chunk_id = %chunk.id, "Chunk has no text. Skipping.");

			continue;
		}

		vectors.push(VectorRecord { id: chunk.id, values, metadata: chunk.metadata });
	}

	service.adapter.upsert(&vectors).await?;
	events::mark_event_status(
		&mut *tx,
		event_id,
		EventStatus::Completed.as_str(),
		OffsetDateTime::now_utc(),
	)
	.await?;
	tx.commit().await?;

	tracing::info!(%event_id, %disclosure_id, vectors = vectors.len(), "Event completed.");

	Ok(EventOutcome::Completed { vectors: vectors.len() })
}

async fn job_loop(state: WorkerState, worker_index: u32, mut shutdown: watch::Receiver<bool>) {
	let poll_interval = Duration::from_millis(state.service.cfg.worker.poll_interval_ms);

	tracing::debug!(worker_index, "Job loop started.");

	while !*shutdown.borrow() {
		let idle = match process_next_job(&state.service).await {
			Ok(processed) => !processed,
			Err(err) => {
				tracing::error!(worker_index, error = %err, "Dispatch job handling failed.");

				true
			},
		};

		if idle {
			tokio::select! {
				_ = tokio_time::sleep(poll_interval) => {},
				_ = shutdown.changed() => {},
			}
		}
	}

	tracing::debug!(worker_index, "Job loop stopped.");
}

async fn maintenance_loop(state: WorkerState, mut shutdown: watch::Receiver<bool>) {
	let cfg = &state.service.cfg.worker;
	let mut sweep = tokio_time::interval(Duration::from_secs(cfg.sweep_interval_seconds.max(1)));
	let mut prune = tokio_time::interval(Duration::from_secs(cfg.prune_interval_seconds.max(1)));

	sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
	prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			changed = shutdown.changed() => {
				if changed.is_err() || *shutdown.borrow() {
					break;
				}
			},
			_ = sweep.tick() => {
				if let Err(err) = state.service.requeue_stale_pending(OffsetDateTime::now_utc()).await {
					tracing::error!(error = %err, "Stale pending sweep failed.");
				}
			},
			_ = prune.tick() => {
				match state.service.dispatcher.prune().await {
					Ok(report) if report.completed + report.failed > 0 => {
						tracing::info!(
							completed = report.completed,
							failed = report.failed,
							"Pruned finished dispatch jobs."
						);
					},
					Ok(_) => {},
					Err(err) => tracing::error!(error = %err, "Dispatch job pruning failed."),
				}
			},
		}
	}
}
