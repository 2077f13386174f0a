use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use inventa_storage::{
	db::Db,
	disclosures,
	dispatch::{self, JOB_ACTIVE, JOB_COMPLETED, JOB_FAILED, JOB_QUEUED},
	events::{self, EventInsert},
	models::DisclosureInsert,
};
use inventa_testkit::TestDatabase;

const QUEUE: &str = "disclosure_event";

async fn connect(test_db: &TestDatabase) -> Db {
	let cfg = inventa_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 4 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

fn disclosure_insert(title: &str, now: OffsetDateTime) -> DisclosureInsert<'_> {
	DisclosureInsert {
		disclosure_id: Uuid::new_v4(),
		title,
		description: "A lens that adapts focus.",
		key_differences: json!([{ "ordinal": 1, "statementMd": "Fluid membrane." }]),
		inventors: json!([{ "name": "A. Inventor" }]),
		uri: None,
		raw_extraction: None,
		public_planned: false,
		public_venue: None,
		public_date: None,
		now,
	}
}

async fn insert_pending_event(db: &Db, disclosure_id: Uuid, now: OffsetDateTime) -> Uuid {
	let payload = json!({ "disclosureId": disclosure_id });
	let key = disclosure_id.to_string();
	let event = EventInsert {
		event_id: Uuid::new_v4(),
		topic: QUEUE,
		name: "disclosure_created",
		key: &key,
		payload: &payload,
		now,
	};

	events::insert_event(&db.pool, &event).await.expect("Failed to insert event.").event_id
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn docket_numbers_are_assigned_from_the_sequence() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping docket_numbers_are_assigned_from_the_sequence; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let first = disclosures::insert_disclosure(&db.pool, &disclosure_insert("First", now))
		.await
		.expect("Failed to insert disclosure.");
	let second = disclosures::insert_disclosure(&db.pool, &disclosure_insert("Second", now))
		.await
		.expect("Failed to insert disclosure.");

	assert!(second.docket_number > first.docket_number);

	let fetched = disclosures::fetch_disclosures(&db.pool, &[first.disclosure_id, Uuid::new_v4()])
		.await
		.expect("Failed to fetch disclosures.");

	assert_eq!(fetched.len(), 1);
	assert_eq!(fetched[0].title, "First");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn rolled_back_transaction_leaves_no_rows() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping rolled_back_transaction_leaves_no_rows; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let mut tx = db.pool.begin().await.expect("Failed to begin transaction.");
	let row = disclosures::insert_disclosure(&mut *tx, &disclosure_insert("Rolled back", now))
		.await
		.expect("Failed to insert disclosure.");

	tx.rollback().await.expect("Failed to roll back.");

	let fetched = disclosures::fetch_disclosure(&db.pool, row.disclosure_id)
		.await
		.expect("Failed to fetch disclosure.");

	assert!(fetched.is_none());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn locked_event_is_skipped_by_a_second_claim() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping locked_event_is_skipped_by_a_second_claim; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let event_id = insert_pending_event(&db, Uuid::new_v4(), now).await;
	let mut first = db.pool.begin().await.expect("Failed to begin transaction.");
	let mut second = db.pool.begin().await.expect("Failed to begin transaction.");
	let claimed = events::claim_event_tx(&mut first, event_id).await.expect("First claim failed.");
	let skipped = events::claim_event_tx(&mut second, event_id).await.expect("Second claim failed.");

	assert!(claimed.is_some());
	assert!(skipped.is_none());

	second.rollback().await.expect("Failed to roll back.");
	first.rollback().await.expect("Failed to roll back.");

	let mut third = db.pool.begin().await.expect("Failed to begin transaction.");
	let reclaimed = events::claim_event_tx(&mut third, event_id).await.expect("Third claim failed.");

	assert!(reclaimed.is_some());

	third.rollback().await.expect("Failed to roll back.");
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn claimed_job_is_leased_and_counts_the_attempt() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping claimed_job_is_leased_and_counts_the_attempt; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let disclosure_id = Uuid::new_v4();
	let event_id = insert_pending_event(&db, disclosure_id, now).await;
	let job_id = dispatch::enqueue_job(&db.pool, QUEUE, event_id, disclosure_id, 3, now)
		.await
		.expect("Failed to enqueue job.");
	let job = dispatch::claim_next_job(&db, QUEUE, now, 60)
		.await
		.expect("Failed to claim job.")
		.expect("Expected a due job.");

	assert_eq!(job.job_id, job_id);
	assert_eq!(job.status, JOB_ACTIVE);
	assert_eq!(job.attempts, 1);

	let none = dispatch::claim_next_job(&db, QUEUE, now + Duration::seconds(30), 60)
		.await
		.expect("Failed to claim job.");

	assert!(none.is_none());

	let expired = dispatch::claim_next_job(&db, QUEUE, now + Duration::seconds(61), 60)
		.await
		.expect("Failed to claim job.")
		.expect("Expected the expired lease to be reclaimable.");

	assert_eq!(expired.attempts, 2);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn rescheduled_job_waits_for_its_backoff() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping rescheduled_job_waits_for_its_backoff; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let disclosure_id = Uuid::new_v4();
	let event_id = insert_pending_event(&db, disclosure_id, now).await;
	let job_id = dispatch::enqueue_job(&db.pool, QUEUE, event_id, disclosure_id, 3, now)
		.await
		.expect("Failed to enqueue job.");

	dispatch::claim_next_job(&db, QUEUE, now, 60).await.expect("Failed to claim job.");
	assert!(
		dispatch::reschedule_job(&db, job_id, 1, "boom", now + Duration::seconds(5), now)
			.await
			.expect("Failed to reschedule job.")
	);

	let early = dispatch::claim_next_job(&db, QUEUE, now + Duration::seconds(1), 60)
		.await
		.expect("Failed to claim job.");

	assert!(early.is_none());

	let due = dispatch::claim_next_job(&db, QUEUE, now + Duration::seconds(5), 60)
		.await
		.expect("Failed to claim job.")
		.expect("Expected the job after its backoff.");

	assert_eq!(due.attempts, 2);
	assert_eq!(due.last_error.as_deref(), Some("boom"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn prune_keeps_the_newest_finished_jobs() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping prune_keeps_the_newest_finished_jobs; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let start = OffsetDateTime::now_utc();

	for offset in 0..4 {
		let now = start + Duration::seconds(offset);
		let disclosure_id = Uuid::new_v4();
		let event_id = insert_pending_event(&db, disclosure_id, now).await;
		let job_id = dispatch::enqueue_job(&db.pool, QUEUE, event_id, disclosure_id, 3, now)
			.await
			.expect("Failed to enqueue job.");

		let (status, error_text) =
			if offset == 3 { (JOB_FAILED, Some("exhausted")) } else { (JOB_COMPLETED, None) };

		dispatch::claim_next_job(&db, QUEUE, now, 60).await.expect("Failed to claim job.");

		assert!(
			dispatch::finish_job(&db.pool, job_id, 1, status, error_text, now)
				.await
				.expect("Failed to finish job.")
		);
	}

	let removed =
		dispatch::prune_jobs(&db, QUEUE, JOB_COMPLETED, 1).await.expect("Failed to prune jobs.");

	assert_eq!(removed, 2);

	let counts = dispatch::job_status_counts(&db.pool, QUEUE).await.expect("Failed to count jobs.");
	let count_of = |status: &str| {
		counts.iter().find(|row| row.status == status).map(|row| row.count).unwrap_or(0)
	};

	assert_eq!(count_of(JOB_COMPLETED), 1);
	assert_eq!(count_of(JOB_FAILED), 1);
	assert_eq!(count_of(JOB_QUEUED), 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn stale_pending_ignores_events_with_live_jobs() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping stale_pending_ignores_events_with_live_jobs; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let then = OffsetDateTime::now_utc() - Duration::minutes(30);
	let orphan_disclosure = Uuid::new_v4();
	let orphan = insert_pending_event(&db, orphan_disclosure, then).await;
	let queued_disclosure = Uuid::new_v4();
	let queued = insert_pending_event(&db, queued_disclosure, then).await;

	dispatch::enqueue_job(&db.pool, QUEUE, queued, queued_disclosure, 3, then)
		.await
		.expect("Failed to enqueue job.");

	let stale = events::stale_pending_events(
		&db.pool,
		QUEUE,
		OffsetDateTime::now_utc() - Duration::minutes(5),
		100,
	)
	.await
	.expect("Failed to list stale events.");

	assert_eq!(stale.iter().map(|event| event.event_id).collect::<Vec<_>>(), vec![orphan]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn job_transitions_belong_to_the_current_delivery() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping job_transitions_belong_to_the_current_delivery; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let disclosure_id = Uuid::new_v4();
	let event_id = insert_pending_event(&db, disclosure_id, now).await;
	let job_id = dispatch::enqueue_job(&db.pool, QUEUE, event_id, disclosure_id, 3, now)
		.await
		.expect("Failed to enqueue job.");

	assert!(
		!dispatch::finish_job(&db.pool, job_id, 0, JOB_COMPLETED, None, now)
			.await
			.expect("Failed to finish job."),
		"A queued job cannot be settled."
	);

	let first = dispatch::claim_next_job(&db, QUEUE, now, 60)
		.await
		.expect("Failed to claim job.")
		.expect("Expected the job.");
	let renewed_until = now + Duration::seconds(90);

	assert!(
		dispatch::renew_lease(&db, job_id, first.attempts, renewed_until, now)
			.await
			.expect("Failed to renew lease.")
	);
	assert!(
		dispatch::claim_next_job(&db, QUEUE, now + Duration::seconds(61), 60)
			.await
			.expect("Failed to claim job.")
			.is_none(),
		"A renewed lease must keep the job invisible."
	);

	let second = dispatch::claim_next_job(&db, QUEUE, now + Duration::seconds(91), 60)
		.await
		.expect("Failed to claim job.")
		.expect("Expected the expired job.");

	assert_eq!(second.attempts, 2);
	assert!(
		!dispatch::renew_lease(&db, job_id, first.attempts, now + Duration::seconds(200), now)
			.await
			.expect("Failed to renew lease.")
	);
	assert!(
		!dispatch::finish_job(&db.pool, job_id, first.attempts, JOB_COMPLETED, None, now)
			.await
			.expect("Failed to finish job.")
	);
	assert!(
		!dispatch::reschedule_job(&db, job_id, first.attempts, "late", now, now)
			.await
			.expect("Failed to reschedule job.")
	);
	assert!(
		dispatch::finish_job(&db.pool, job_id, second.attempts, JOB_FAILED, Some("boom"), now)
			.await
			.expect("Failed to finish job.")
	);

	let job = dispatch::fetch_job(&db.pool, job_id)
		.await
		.expect("Failed to fetch job.")
		.expect("Expected the job row.");

	assert_eq!(job.status, JOB_FAILED);
	assert_eq!(job.last_error.as_deref(), Some("boom"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set INVENTA_PG_DSN to run."]
async fn exhaustion_leaves_completed_events_alone() {
	let Some(base_dsn) = inventa_testkit::env_dsn() else {
		eprintln!("Skipping exhaustion_leaves_completed_events_alone; set INVENTA_PG_DSN.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let now = OffsetDateTime::now_utc();
	let failed = insert_pending_event(&db, Uuid::new_v4(), now).await;
	let completed = insert_pending_event(&db, Uuid::new_v4(), now).await;

	events::mark_event_status(&db.pool, completed, "completed", now)
		.await
		.expect("Failed to mark event.");

	assert!(events::fail_exhausted_event(&db.pool, failed, now).await.expect("Update failed."));
	assert!(!events::fail_exhausted_event(&db.pool, completed, now).await.expect("Update failed."));

	let failed = events::fetch_event(&db.pool, failed).await.expect("Fetch failed.").expect("Row.");
	let completed =
		events::fetch_event(&db.pool, completed).await.expect("Fetch failed.").expect("Row.");

	assert_eq!((failed.status.as_str(), failed.attempt_count), ("failed", 1));
	assert_eq!((completed.status.as_str(), completed.attempt_count), ("completed", 0));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
