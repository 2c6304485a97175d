//! Keyword and vector hit fusion for one collection.
//!
//! Keyword scores are divided by the batch maximum, vector similarities are used as-is,
//! hits are merged by parent document id in first-seen order (keyword hits first), and the
//! merged list is stably sorted by the weighted score so equal scores keep that order.

use std::collections::HashMap;

use cura_config::SearchFusion;
use serde_json::Value;

use crate::search::{MergedHit, SourceHit};

/// Vector payload field naming the document a passage belongs to.
pub const PARENT_ID_FIELD: &str = "parent_id";

/// Maps native keyword scores onto `[0, 1]` by the batch maximum.
///
/// A non-positive or non-finite maximum yields all zeros.
pub fn normalize_keyword_scores(hits: &[SourceHit]) -> Vec<f32> {
	let max = hits
		.iter()
		.map(|hit| hit.score)
		.filter(|score| score.is_finite())
		.fold(0.0_f32, f32::max);

	if max <= 0.0 {
		return vec![0.0; hits.len()];
	}

	hits.iter()
		.map(|hit| if hit.score.is_finite() { (hit.score / max).clamp(0.0, 1.0) } else { 0.0 })
		.collect()
}

/// Resolves the document a vector hit belongs to.
///
/// The `parent_id` payload field wins; otherwise an id of the form `<doc><separator><passage>`
/// maps to `<doc>`.
pub fn parent_document_id(hit: &SourceHit, passage_separator: &str) -> String {
	if let Some(parent) = hit
		.payload
		.get(PARENT_ID_FIELD)
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|parent| !parent.is_empty())
	{
		return parent.to_string();
	}
	if !passage_separator.is_empty()
		&& let Some((parent, _)) = hit.id.split_once(passage_separator)
		&& !parent.is_empty()
	{
		return parent.to_string();
	}

	hit.id.clone()
}

pub fn final_score(
	weights: &SearchFusion,
	keyword_score: f32,
	semantic_score: f32,
	found_in_both: bool,
) -> f32 {
	if found_in_both {
		weights.both_keyword_weight * keyword_score
			+ weights.both_semantic_weight * semantic_score
			+ weights.intersection_bonus
	} else {
		weights.single_keyword_weight * keyword_score
			+ weights.single_semantic_weight * semantic_score
	}
}

pub fn fuse(
	keyword_hits: &[SourceHit],
	vector_hits: &[SourceHit],
	weights: &SearchFusion,
	passage_separator: &str,
	limit: usize,
) -> Vec<MergedHit> {
	let normalized = normalize_keyword_scores(keyword_hits);
	let mut candidates: Vec<Candidate> = Vec::with_capacity(keyword_hits.len() + vector_hits.len());
	let mut index_by_id: HashMap<String, usize> = HashMap::new();

	for (hit, keyword_score) in keyword_hits.iter().zip(normalized) {
		if weights.keyword_min_ratio > 0.0 && keyword_score < weights.keyword_min_ratio {
			continue;
		}

		match index_by_id.get(&hit.id) {
			Some(&index) => {
				let candidate = &mut candidates[index];

				candidate.keyword_score = candidate.keyword_score.max(keyword_score);
			},
			None => {
				index_by_id.insert(hit.id.clone(), candidates.len());
				candidates.push(Candidate {
					id: hit.id.clone(),
					keyword_score,
					semantic_score: 0.0,
					from_keyword: true,
					from_vector: false,
					metadata: hit.payload.clone(),
				});
			},
		}
	}

	for hit in vector_hits {
		let id = parent_document_id(hit, passage_separator);
		let semantic_score = if hit.score.is_finite() { hit.score.clamp(0.0, 1.0) } else { 0.0 };

		match index_by_id.get(&id) {
			Some(&index) => {
				let candidate = &mut candidates[index];

				candidate.semantic_score = candidate.semantic_score.max(semantic_score);
				candidate.from_vector = true;
			},
			None => {
				index_by_id.insert(id.clone(), candidates.len());
				candidates.push(Candidate {
					id,
					keyword_score: 0.0,
					semantic_score,
					from_keyword: false,
					from_vector: true,
					metadata: hit.payload.clone(),
				});
			},
		}
	}

	let mut merged: Vec<MergedHit> = candidates
		.into_iter()
		.map(|candidate| {
			let found_in_both = candidate.from_keyword && candidate.from_vector;

			MergedHit {
				final_score: final_score(
					weights,
					candidate.keyword_score,
					candidate.semantic_score,
					found_in_both,
				),
				id: candidate.id,
				keyword_score: candidate.keyword_score,
				semantic_score: candidate.semantic_score,
				found_in_both,
				metadata: candidate.metadata,
			}
		})
		.collect();

	// `sort_by` is stable: ties keep first-seen order.
	merged.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
	merged.truncate(limit);

	merged
}

struct Candidate {
	id: String,
	keyword_score: f32,
	semantic_score: f32,
	from_keyword: bool,
	from_vector: bool,
	metadata: Value,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::search::SourceOrigin;

	fn keyword(id: &str, score: f32) -> SourceHit {
		SourceHit {
			id: id.to_string(),
			score,
			payload: serde_json::json!({ "title": id }),
			origin: SourceOrigin::Keyword,
		}
	}

	fn vector(id: &str, score: f32) -> SourceHit {
		SourceHit {
			id: id.to_string(),
			score,
			payload: serde_json::json!({}),
			origin: SourceOrigin::Vector,
		}
	}

	fn ids(hits: &[MergedHit]) -> Vec<&str> {
		hits.iter().map(|hit| hit.id.as_str()).collect()
	}

	fn assert_close(actual: f32, expected: f32) {
		assert!((actual - expected).abs() < 1e-5, "expected {expected}, got {actual}");
	}

	#[test]
	fn kidney_disease_scenario_ranks_corroborated_hit_first() {
		let keyword_hits = vec![
			keyword("ckd-overview", 9.1),
			keyword("ckd-diet", 7.2),
			keyword("ckd-stages", 7.2),
			keyword("dialysis", 3.0),
			keyword("transplant", 1.0),
		];
		let vector_hits = vec![
			vector("ace-inhibitors", 0.91),
			vector("ckd-overview", 0.80),
			vector("sglt2", 0.55),
			vector("anemia", 0.40),
			vector("gout", 0.10),
		];
		let merged = fuse(&keyword_hits, &vector_hits, &SearchFusion::default(), "#", 5);

		assert_eq!(merged.len(), 5);
		assert_eq!(merged[0].id, "ckd-overview");
		assert!(merged[0].found_in_both);
		assert_close(merged[0].keyword_score, 1.0);
		assert_close(merged[0].semantic_score, 0.80);
		assert_close(merged[0].final_score, 0.3 + 0.5 * 0.80 + 0.2);
		assert_eq!(merged[0].metadata["title"], "ckd-overview");
		assert_eq!(merged.iter().filter(|hit| hit.found_in_both).count(), 1);
	}

	#[test]
	fn hit_found_by_both_scores_0_955_at_full_scores() {
		let keyword_hits = vec![keyword("ckd", 9.1), keyword("aki", 7.2)];
		let vector_hits = vec![vector("sglt2", 0.95), vector("ckd", 0.91)];
		let merged = fuse(&keyword_hits, &vector_hits, &SearchFusion::default(), "#", 5);

		assert_eq!(merged[0].id, "ckd");
		assert_close(merged[0].final_score, 0.955);
		assert_close(merged[1].final_score, 0.6 * 0.95);
	}

	#[test]
	fn empty_inputs_yield_empty_output() {
		let merged = fuse(&[], &[], &SearchFusion::default(), "#", 5);

		assert!(merged.is_empty());
	}

	#[test]
	fn zero_maximum_normalizes_to_zero() {
		let hits = vec![keyword("a", 0.0), keyword("b", 0.0)];

		assert_eq!(normalize_keyword_scores(&hits), vec![0.0, 0.0]);
	}

	#[test]
	fn scaling_keyword_scores_preserves_ranking() {
		let base = vec![keyword("a", 4.0), keyword("b", 2.5), keyword("c", 0.5)];
		let scaled: Vec<SourceHit> =
			base.iter().map(|hit| keyword(&hit.id, hit.score * 37.0)).collect();
		let vector_hits = vec![vector("c", 0.9), vector("d", 0.3)];
		let weights = SearchFusion::default();
		let left = fuse(&base, &vector_hits, &weights, "#", 10);
		let right = fuse(&scaled, &vector_hits, &weights, "#", 10);

		assert_eq!(ids(&left), ids(&right));

		for (l, r) in left.iter().zip(&right) {
			assert_close(l.keyword_score, r.keyword_score);
			assert_close(l.final_score, r.final_score);
		}
	}

	#[test]
	fn ties_keep_first_seen_order() {
		let keyword_hits = vec![keyword("first", 5.0), keyword("second", 5.0)];
		let vector_hits = vec![vector("third", 0.0), vector("fourth", 0.0)];
		let merged = fuse(&keyword_hits, &vector_hits, &SearchFusion::default(), "#", 10);

		assert_eq!(ids(&merged), vec!["first", "second", "third", "fourth"]);
	}

	#[test]
	fn corroboration_beats_either_single_source() {
		let weights = SearchFusion::default();

		for (kw, sem) in [(0.0, 0.0), (0.5, 0.5), (1.0, 0.2), (0.3, 1.0), (1.0, 1.0)] {
			let both = final_score(&weights, kw, sem, true);

			assert!(both > final_score(&weights, kw, 0.0, false));
			assert!(both > final_score(&weights, 0.0, sem, false));
			assert!((0.0..=1.2).contains(&both));
		}
	}

	#[test]
	fn final_scores_stay_within_bounds() {
		let keyword_hits = vec![keyword("a", 12.0), keyword("b", -3.0), keyword("c", f32::NAN)];
		let vector_hits = vec![vector("a", 1.7), vector("d", -0.2), vector("e", 0.5)];
		let merged = fuse(&keyword_hits, &vector_hits, &SearchFusion::default(), "#", 10);

		assert_eq!(merged.len(), 5);

		for hit in &merged {
			assert!((0.0..=1.2).contains(&hit.final_score), "{hit:?}");
		}

		assert_close(merged[0].final_score, 1.0);
	}

	#[test]
	fn passages_map_to_parent_documents() {
		let keyword_hits = vec![keyword("ckd", 2.0)];
		let mut tagged = vector("chunk-17", 0.4);

		tagged.payload = serde_json::json!({ "parent_id": "ckd" });

		let vector_hits =
			vec![vector("ckd#3", 0.7), tagged, vector("aki#1", 0.6), vector("aki#2", 0.9)];
		let merged = fuse(&keyword_hits, &vector_hits, &SearchFusion::default(), "#", 10);

		assert_eq!(ids(&merged), vec!["ckd", "aki"]);
		assert!(merged[0].found_in_both);
		assert_close(merged[0].semantic_score, 0.7);
		assert_close(merged[1].semantic_score, 0.9);
	}

	#[test]
	fn custom_separator_is_honored() {
		let hit = vector("metformin::dosage", 0.5);

		assert_eq!(parent_document_id(&hit, "::"), "metformin");
		assert_eq!(parent_document_id(&hit, "#"), "metformin::dosage");
		assert_eq!(parent_document_id(&vector("#orphan", 0.5), "#"), "#orphan");
	}

	#[test]
	fn duplicate_keyword_ids_keep_best_score() {
		let keyword_hits = vec![keyword("a", 2.0), keyword("b", 4.0), keyword("a", 4.0)];
		let merged = fuse(&keyword_hits, &[], &SearchFusion::default(), "#", 10);

		assert_eq!(ids(&merged), vec!["a", "b"]);
		assert_close(merged[0].keyword_score, 1.0);
	}

	#[test]
	fn keyword_min_ratio_drops_weak_hits() {
		let weights = SearchFusion { keyword_min_ratio: 0.8, ..SearchFusion::default() };
		let keyword_hits = vec![keyword("a", 10.0), keyword("b", 8.5), keyword("c", 7.9)];
		let merged = fuse(&keyword_hits, &[], &weights, "#", 10);

		assert_eq!(ids(&merged), vec!["a", "b"]);
	}

	#[test]
	fn limit_truncates_after_sorting() {
		let keyword_hits = vec![keyword("low", 1.0), keyword("high", 10.0)];
		let merged = fuse(&keyword_hits, &[], &SearchFusion::default(), "#", 1);

		assert_eq!(ids(&merged), vec!["high"]);
	}

	#[test]
	fn identical_inputs_fuse_identically() {
		let keyword_hits = vec![keyword("a", 3.0), keyword("b", 1.0)];
		let vector_hits = vec![vector("b", 0.8), vector("c", 0.6)];
		let weights = SearchFusion::default();

		assert_eq!(
			fuse(&keyword_hits, &vector_hits, &weights, "#", 10),
			fuse(&keyword_hits, &vector_hits, &weights, "#", 10)
		);
	}
}
