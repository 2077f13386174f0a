use time::OffsetDateTime;
use uuid::Uuid;

use inventa_domain::{
	disclosure::{Disclosure, NewDisclosure},
	event::{DisclosureCreated, EventPayload},
	validate,
};
use inventa_storage::{disclosures, events, events::EventInsert};

use crate::{InventaService, Result, records};

/// A committed disclosure and the id of the outbox event written with it.
#[derive(Clone, Debug)]
pub struct CreatedDisclosure {
	pub disclosure: Disclosure,
	pub event_id: Uuid,
	/// `None` when the dispatcher rejected the job. The event then stays `pending` until the
	/// stale-pending sweep picks it up.
	pub job_id: Option<Uuid>,
}

impl InventaService {
	/// Validates `input`, then stores it together with its `disclosure_created` event.
	pub async fn create_disclosure(&self, input: NewDisclosure) -> Result<CreatedDisclosure> {
		validate::validate_new_disclosure(&input)?;

		self.record_disclosure(&input).await
	}

	/// Writes the disclosure and its event in one transaction, then submits a dispatch job.
	///
	/// Nothing is persisted and no job is submitted when the transaction fails. A submission
	/// failure after commit is logged and leaves the event `pending`.
	pub async fn record_disclosure(&self, input: &NewDisclosure) -> Result<CreatedDisclosure> {
		let now = OffsetDateTime::now_utc();
		let disclosure_id = Uuid::new_v4();
		let insert = records::disclosure_insert(input, disclosure_id, now)?;
		let mut tx = self.db.pool.begin().await?;
		let row = disclosures::insert_disclosure(&mut *tx, &insert).await?;
		let payload = EventPayload::DisclosureCreated(DisclosureCreated {
			disclosure_id: row.disclosure_id,
			docket_number: row.docket_number,
			title: row.title.clone(),
		});
		let payload_json = payload.to_json();
		let key = payload.key();
		let event = events::insert_event(
			&mut *tx,
			&EventInsert {
				event_id: Uuid::new_v4(),
				topic: payload.topic(),
				name: payload.name(),
				key: &key,
				payload: &payload_json,
				now,
			},
		)
		.await?;

		tx.commit().await?;

		let disclosure = records::disclosure_from_row(row)?;

		tracing::info!(
			disclosure_id = %disclosure.id,
			docket_number = disclosure.docket_number,
			event_id = %event.event_id,
			"Disclosure created."
		);

		let job_id = match self.dispatcher.submit(event.event_id, disclosure.id).await {
			Ok(job_id) => Some(job_id),
			Err(err) => {
				tracing::warn!(
					error = %err,
					event_id = %event.event_id,
					"Dispatch submission failed. The event stays pending for the sweep."
				);

				None
			},
		};

		Ok(CreatedDisclosure { disclosure, event_id: event.event_id, job_id })
	}

	pub async fn get_disclosure(&self, disclosure_id: Uuid) -> Result<Option<Disclosure>> {
		disclosures::fetch_disclosure(&self.db.pool, disclosure_id)
			.await?
			.map(records::disclosure_from_row)
			.transpose()
	}
}
