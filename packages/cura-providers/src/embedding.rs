//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
	model: &'a str,
	input: &'a [String],
	dimensions: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds `texts` in one request and returns one vector per input, in input order.
pub async fn embed(
	cfg: &cura_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let body = EmbeddingRequest { model: &cfg.model, input: texts, dimensions: cfg.dimensions };
	let raw = client
		.post(format!("{}{}", cfg.api_base, cfg.path))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?
		.bytes()
		.await?;
	let vectors = parse_embedding_response(&raw)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding provider returned {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	tracing::debug!(
		provider_id = %cfg.provider_id,
		inputs = texts.len(),
		dimensions = vectors.first().map(Vec::len).unwrap_or_default(),
		"Embedding request completed."
	);

	Ok(vectors)
}

/// Orders items by their `index` field, falling back to response position.
fn parse_embedding_response(raw: &[u8]) -> Result<Vec<Vec<f32>>> {
	let response: EmbeddingResponse = serde_json::from_slice(raw).map_err(|err| {
		Error::InvalidResponse { message: format!("Malformed embedding response: {err}.") }
	})?;
	let mut items: Vec<(usize, Vec<f32>)> = response
		.data
		.into_iter()
		.enumerate()
		.map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
		.collect();

	items.sort_by_key(|(index, _)| *index);

	Ok(items.into_iter().map(|(_, embedding)| embedding).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn orders_vectors_by_index() {
		let raw = br#"{"data":[
			{"index":1,"embedding":[2.0,3.0]},
			{"index":0,"embedding":[0.5,1.5]}
		]}"#;
		let parsed = parse_embedding_response(raw).expect("parse failed");

		assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn missing_index_keeps_response_order() {
		let raw = br#"{"data":[{"embedding":[1.0]},{"embedding":[2.0]}]}"#;

		assert_eq!(parse_embedding_response(raw).expect("parse failed"), vec![
			vec![1.0],
			vec![2.0]
		]);
	}

	#[test]
	fn rejects_non_numeric_values() {
		let raw = br#"{"data":[{"index":0,"embedding":["x"]}]}"#;
		let err = parse_embedding_response(raw).expect_err("expected invalid response");

		assert!(matches!(err, Error::InvalidResponse { .. }));
		assert!(err.to_string().starts_with("Malformed embedding response"));
	}

	#[test]
	fn rejects_missing_data() {
		let err = parse_embedding_response(br#"{"object":"list"}"#).expect_err("expected error");

		assert!(err.to_string().contains("data"));
	}
}
