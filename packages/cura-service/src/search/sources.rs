use crate::{
	Article, KeywordStore, LiteratureProvider, VectorIndex,
	search::{SourceHit, SourceOrigin},
};

/// Inputs shared by every adapter for one lookup.
#[derive(Debug, Clone, Copy)]
pub struct SourceQuery<'a> {
	pub text: &'a str,
	/// Query embedding; vector lookups without one return nothing.
	pub embedding: Option<&'a [f32]>,
	pub limit: u32,
}

/// The closed set of retrieval sources behind one `search` capability.
///
/// Adapters never fail: backend errors are logged and become an empty list, and results are
/// capped at the query limit in descending score order.
pub enum SourceAdapter<'a> {
	Keyword { store: &'a dyn KeywordStore, collection: &'a str },
	Vector { index: &'a dyn VectorIndex, namespace: &'a str },
	Literature { provider: &'a dyn LiteratureProvider },
}
impl SourceAdapter<'_> {
	pub fn origin(&self) -> SourceOrigin {
		match self {
			Self::Keyword { .. } => SourceOrigin::Keyword,
			Self::Vector { .. } => SourceOrigin::Vector,
			Self::Literature { .. } => SourceOrigin::Literature,
		}
	}

	pub async fn search(&self, query: &SourceQuery<'_>) -> Vec<SourceHit> {
		if query.limit == 0 {
			return Vec::new();
		}

		let outcome = match self {
			Self::Keyword { store, collection } => {
				store.search_text(collection, query.text, query.limit).await
			},
			Self::Vector { index, namespace } => {
				let Some(embedding) = query.embedding else {
					tracing::debug!(namespace, "Vector lookup skipped without an embedding.");

					return Vec::new();
				};

				index.query(namespace, embedding, query.limit).await
			},
			Self::Literature { provider } => {
				provider.search(query.text, query.limit).await.map(literature_hits)
			},
		};

		match outcome {
			Ok(mut hits) => {
				if matches!(self, Self::Vector { .. }) {
					for hit in &mut hits {
						hit.score = if hit.score.is_finite() { hit.score.clamp(0.0, 1.0) } else { 0.0 };
					}
				}

				hits.sort_by(|a, b| b.score.total_cmp(&a.score));
				hits.truncate(query.limit as usize);

				hits
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					origin = ?self.origin(),
					source = self.label(),
					"Source lookup failed; continuing with no hits from it."
				);

				Vec::new()
			},
		}
	}

	fn label(&self) -> &str {
		match self {
			Self::Keyword { collection, .. } => collection,
			Self::Vector { namespace, .. } => namespace,
			Self::Literature { .. } => "literature",
		}
	}
}

/// Ranks articles by their position in the provider's answer: `(n - rank) / n`.
pub fn literature_hits(articles: Vec<Article>) -> Vec<SourceHit> {
	let total = articles.len();

	articles
		.into_iter()
		.enumerate()
		.map(|(rank, article)| SourceHit {
			score: (total - rank) as f32 / total as f32,
			id: article.id.clone(),
			payload: serde_json::to_value(&article).unwrap_or_default(),
			origin: SourceOrigin::Literature,
		})
		.collect()
}
