//! Reduction of fragment-level index matches to ranked parent disclosures.
//!
//! Every disclosure is published as several chunk vectors, so a nearest-neighbour query returns
//! fragments rather than records. The index is over-fetched, matches are grouped by
//! `disclosure_id`, and each disclosure is scored by its best chunk.

use std::{cmp::Ordering, collections::HashMap};

use uuid::Uuid;

use crate::{chunk::ChunkMetadata, disclosure::Disclosure};

pub const DEFAULT_OVER_FETCH_FACTOR: u32 = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct IndexMatch {
	pub id: String,
	pub score: f32,
	pub metadata: Option<ChunkMetadata>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
	pub disclosure_id: Uuid,
	pub score: f32,
}

/// Number of chunk matches requested for `top_k` disclosures.
pub fn over_fetch(top_k: u32, factor: u32) -> u32 {
	top_k.saturating_mul(factor.max(1))
}

/// Composite text embedded as the query vector for a disclosure.
pub fn query_text(disclosure: &Disclosure) -> String {
	let mut parts = Vec::with_capacity(disclosure.key_differences.len() + 2);

	if !disclosure.title.trim().is_empty() {
		parts.push(disclosure.title.clone());
	}
	if !disclosure.description.trim().is_empty() {
		parts.push(disclosure.description.clone());
	}

	for key_difference in &disclosure.key_differences {
		if key_difference.statement_md.trim().is_empty() {
			continue;
		}

		parts.push(format!("{}. {}", key_difference.ordinal, key_difference.statement_md));
	}

	parts.join("\n")
}

/// Distinct candidate disclosures with their best chunk score, highest first.
///
/// Matches without metadata and matches belonging to `source_id` are dropped. Ties keep the order
/// in which the disclosures first appeared in `matches`.
pub fn best_candidates(matches: &[IndexMatch], source_id: Uuid) -> Vec<Candidate> {
	let mut order = Vec::new();
	let mut best: HashMap<Uuid, f32> = HashMap::new();

	for item in matches {
		let Some(metadata) = item.metadata.as_ref() else {
			continue;
		};

		if metadata.disclosure_id == source_id {
			continue;
		}

		match best.get_mut(&metadata.disclosure_id) {
			Some(score) =>
				if item.score > *score {
					*score = item.score;
				},
			None => {
				order.push(metadata.disclosure_id);
				best.insert(metadata.disclosure_id, item.score);
			},
		}
	}

	let mut candidates = order
		.into_iter()
		.map(|disclosure_id| Candidate { disclosure_id, score: best[&disclosure_id] })
		.collect::<Vec<_>>();

	candidates.sort_by(|a, b| cmp_score_desc(a.score, b.score));

	candidates
}

/// Sorts scored items by descending score and keeps the first `top_k`.
pub fn rank<T>(mut items: Vec<(T, f32)>, top_k: usize) -> Vec<(T, f32)> {
	items.sort_by(|a, b| cmp_score_desc(a.1, b.1));
	items.truncate(top_k);

	items
}

fn cmp_score_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
