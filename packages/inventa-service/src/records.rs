use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use inventa_domain::disclosure::{Disclosure, NewDisclosure};
use inventa_storage::models::{DisclosureInsert, DisclosureRow};

use crate::{Error, Result};

pub fn disclosure_from_row(row: DisclosureRow) -> Result<Disclosure> {
	let key_differences = decode_column(row.disclosure_id, "key_differences", row.key_differences)?;
	let inventors = decode_column(row.disclosure_id, "inventors", row.inventors)?;
	let raw_extraction = match row.raw_extraction {
		Some(Value::Null) | None => None,
		Some(value) => Some(decode_column(row.disclosure_id, "raw_extraction", value)?),
	};

	Ok(Disclosure {
		id: row.disclosure_id,
		docket_number: row.docket_number,
		title: row.title,
		description: row.description,
		key_differences,
		inventors,
		uri: row.uri,
		raw_extraction,
		public_planned: row.public_planned,
		public_venue: row.public_venue,
		public_date: row.public_date,
		created_at: row.created_at,
		updated_at: row.updated_at,
	})
}

pub fn disclosure_insert(
	input: &NewDisclosure,
	disclosure_id: Uuid,
	now: OffsetDateTime,
) -> Result<DisclosureInsert<'_>> {
	Ok(DisclosureInsert {
		disclosure_id,
		title: input.title.trim(),
		description: input.description.trim(),
		key_differences: encode_column("key_differences", &input.key_differences)?,
		inventors: encode_column("inventors", &input.inventors)?,
		uri: input.uri.as_deref(),
		raw_extraction: input
			.raw_extraction
			.as_ref()
			.map(|raw| encode_column("raw_extraction", raw))
			.transpose()?,
		public_planned: input.public_planned,
		public_venue: input.public_venue.as_deref(),
		public_date: input.public_date,
		now,
	})
}

fn decode_column<T>(disclosure_id: Uuid, column: &str, value: Value) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	serde_json::from_value(value).map_err(|err| Error::Storage {
		message: format!("Disclosure {disclosure_id} has a malformed {column} column: {err}."),
	})
}

fn encode_column<T>(column: &str, value: &T) -> Result<Value>
where
	T: serde::Serialize,
{
	serde_json::to_value(value).map_err(|err| Error::InvalidRequest {
		message: format!("Failed to encode {column}: {err}."),
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn row(key_differences: Value) -> DisclosureRow {
		let now = OffsetDateTime::now_utc();

		DisclosureRow {
			disclosure_id: Uuid::new_v4(),
			docket_number: 9,
			title: "Adaptive lens".to_string(),
			description: "Focus by membrane.".to_string(),
			key_differences,
			inventors: json!([{ "name": "A. Inventor" }]),
			uri: None,
			raw_extraction: Some(Value::Null),
			public_planned: false,
			public_venue: None,
			public_date: None,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn row_decodes_camel_case_columns() {
		let disclosure = disclosure_from_row(row(json!([{
			"ordinal": 1,
			"statementMd": "Fluid membrane.",
			"contrast": { "priorArt": "Glass.", "ourApproach": "Fluid.", "whyItMatters": "Speed." },
			"evidenceSpans": [{ "page": 2, "text": "see fig. 2" }],
			"confidence": 0.9
		}])))
		.expect("Decode failed.");

		assert_eq!(disclosure.key_differences[0].contrast.prior_art, "Glass.");
		assert_eq!(disclosure.key_differences[0].evidence_spans[0].page, 2);
		assert_eq!(disclosure.inventors[0].name, "A. Inventor");
		assert!(disclosure.raw_extraction.is_none());
	}

	#[test]
	fn malformed_column_is_a_storage_error() {
		let err = disclosure_from_row(row(json!({ "not": "a list" })))
			.expect_err("Expected a decode failure.");

		assert!(matches!(err, Error::Storage { .. }));
	}
}
