use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use inventa_domain::{disclosure::Disclosure, similarity};
use inventa_storage::disclosures;

use crate::{Error, InventaService, Result, records};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarDisclosure {
	pub disclosure: Disclosure,
	pub similarity_score: f32,
}

impl InventaService {
	/// Disclosures closest to `disclosure_id`, ranked by their best matching chunk.
	///
	/// Candidates whose record no longer exists are dropped. Fails with `NotFound` only when the
	/// source disclosure itself is missing.
	pub async fn find_similar(
		&self,
		disclosure_id: Uuid,
		top_k: Option<u32>,
	) -> Result<Vec<SimilarDisclosure>> {
		let top_k = top_k.unwrap_or(self.cfg.similarity.default_top_k);
		let Some(source) = self.get_disclosure(disclosure_id).await? else {
			return Err(Error::NotFound { message: format!("Disclosure {disclosure_id}.") });
		};

		if top_k == 0 {
			return Ok(Vec::new());
		}

		let vector = self.adapter.embed(&similarity::query_text(&source)).await?;
		let limit = similarity::over_fetch(top_k, self.cfg.similarity.over_fetch_factor);
		let matches = self.adapter.query(&vector, limit).await?;
		let candidates = similarity::best_candidates(&matches, source.id);

		if candidates.is_empty() {
			return Ok(Vec::new());
		}

		let ids = candidates.iter().map(|candidate| candidate.disclosure_id).collect::<Vec<_>>();
		let mut loaded = HashMap::new();

		for row in disclosures::fetch_disclosures(&self.db.pool, &ids).await? {
			let disclosure = records::disclosure_from_row(row)?;

			loaded.insert(disclosure.id, disclosure);
		}

		let scored = candidates
			.into_iter()
			.filter_map(|candidate| {
				loaded.remove(&candidate.disclosure_id).map(|disclosure| (disclosure, candidate.score))
			})
			.collect::<Vec<_>>();

		tracing::debug!(
			%disclosure_id,
			matches = matches.len(),
			candidates = scored.len(),
			"Similarity query reduced."
		);

		Ok(similarity::rank(scored, top_k as usize)
			.into_iter()
			.map(|(disclosure, similarity_score)| SimilarDisclosure { disclosure, similarity_score })
			.collect())
	}
}
