use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
	Result,
	models::{DisclosureInsert, DisclosureRow},
};

const DISCLOSURE_COLUMNS: &str = "\
	disclosure_id,
	docket_number,
	title,
	description,
	key_differences,
	inventors,
	uri,
	raw_extraction,
	public_planned,
	public_venue,
	public_date,
	created_at,
	updated_at";

pub async fn insert_disclosure<'e, E>(executor: E, row: &DisclosureInsert<'_>) -> Result<DisclosureRow>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"\
INSERT INTO disclosures (
	disclosure_id,
	title,
	description,
	key_differences,
	inventors,
	uri,
	raw_extraction,
	public_planned,
	public_venue,
	public_date,
	created_at,
	updated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
RETURNING {DISCLOSURE_COLUMNS}"
	);
	let inserted = sqlx::query_as::<_, DisclosureRow>(&sql)
		.bind(row.disclosure_id)
		.bind(row.title)
		.bind(row.description)
		.bind(&row.key_differences)
		.bind(&row.inventors)
		.bind(row.uri)
		.bind(row.raw_extraction.as_ref())
		.bind(row.public_planned)
		.bind(row.public_venue)
		.bind(row.public_date)
		.bind(row.now)
		.fetch_one(executor)
		.await?;

	Ok(inserted)
}

pub async fn fetch_disclosure<'e, E>(executor: E, disclosure_id: Uuid) -> Result<Option<DisclosureRow>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT {DISCLOSURE_COLUMNS} FROM disclosures WHERE disclosure_id = $1");
	let row = sqlx::query_as::<_, DisclosureRow>(&sql)
		.bind(disclosure_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// Loads every existing disclosure among `disclosure_ids`. Missing ids are silently absent.
pub async fn fetch_disclosures<'e, E>(
	executor: E,
	disclosure_ids: &[Uuid],
) -> Result<Vec<DisclosureRow>>
where
	E: PgExecutor<'e>,
{
	if disclosure_ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql =
		format!("SELECT {DISCLOSURE_COLUMNS} FROM disclosures WHERE disclosure_id = ANY($1)");
	let rows = sqlx::query_as::<_, DisclosureRow>(&sql)
		.bind(disclosure_ids)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

/// Deletes the row only. Published vectors and the outbox event are left in place.
pub async fn delete_disclosure<'e, E>(executor: E, disclosure_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM disclosures WHERE disclosure_id = $1")
		.bind(disclosure_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}
