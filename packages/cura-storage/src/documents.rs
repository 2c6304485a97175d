use serde_json::Value;
use sqlx::PgExecutor;

use crate::{Error, Result};

/// One keyword hit. `score` is `ts_rank_cd`, unbounded and only comparable within one query.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentMatch {
	pub doc_id: String,
	pub score: f32,
	pub title: String,
	pub snippet: String,
	pub metadata: Value,
}

pub async fn search_text(
	executor: impl PgExecutor<'_>,
	collection: &str,
	query: &str,
	limit: u32,
) -> Result<Vec<DocumentMatch>> {
	if limit == 0 {
		return Err(Error::InvalidArgument("limit must be greater than zero.".to_string()));
	}

	let rows: Vec<DocumentMatch> = sqlx::query_as(
		"\
WITH q AS (
	SELECT websearch_to_tsquery('english', $2) AS query
)
SELECT
	d.doc_id,
	ts_rank_cd(d.search_tsv, q.query) AS score,
	d.title,
	ts_headline('english', d.body, q.query, 'MaxFragments=2, MaxWords=40, MinWords=15') AS snippet,
	d.metadata
FROM documents d, q
WHERE d.collection = $1
	AND d.search_tsv @@ q.query
ORDER BY score DESC, d.doc_id ASC
LIMIT $3",
	)
	.bind(collection)
	.bind(query)
	.bind(i64::from(limit))
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
