//! Client for an NCBI E-utilities compatible bibliographic API.
//!
//! A search is a two-step conversation: an identifier search (`esearch`) followed by
//! batched summary fetches (`esummary`). HTTP 429 responses are retried with a linear
//! backoff of `backoff_base_ms * attempt`; once `max_attempts` requests have all been
//! rate limited the call fails with [`Error::RateLimited`].

use std::{
	num::NonZeroUsize,
	sync::{Mutex, MutexGuard},
	time::Duration,
};

use lru::LruCache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSearch {
	/// Total matches reported by the API, which may exceed `ids.len()`.
	pub count: u64,
	pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
	pub id: String,
	pub title: String,
	pub journal: Option<String>,
	pub published: Option<String>,
	pub authors: Vec<String>,
	pub url: Option<String>,
}

type IdCacheKey = (String, u32);

pub struct LiteratureClient {
	cfg: cura_config::LiteratureProviderConfig,
	http: Client,
	id_cache: Mutex<LruCache<IdCacheKey, IdSearch>>,
}
impl LiteratureClient {
	pub fn new(cfg: &cura_config::LiteratureProviderConfig) -> Result<Self> {
		let http = Client::builder()
			.timeout(Duration::from_millis(cfg.timeout_ms))
			.default_headers(crate::extra_headers(&cfg.default_headers)?)
			.build()?;
		let capacity =
			NonZeroUsize::new(cfg.id_cache_max_entries as usize).unwrap_or(NonZeroUsize::MIN);

		Ok(Self { cfg: cfg.clone(), http, id_cache: Mutex::new(LruCache::new(capacity)) })
	}

	/// Resolves identifiers, then fetches their summaries in order.
	pub async fn search(&self, query: &str, max_results: u32) -> Result<Vec<Article>> {
		let found = self.search_ids(query, max_results).await?;

		if found.ids.is_empty() {
			return Ok(Vec::new());
		}

		self.fetch_summaries(&found.ids).await
	}

	/// Identifier search, memoized per `(query, max_results)` for the client lifetime.
	pub async fn search_ids(&self, query: &str, max_results: u32) -> Result<IdSearch> {
		let key = (query.trim().to_string(), max_results);
		let cached = self.lock_cache().peek(&key).cloned();

		if let Some(cached) = cached {
			tracing::debug!(
				provider_id = %self.cfg.provider_id,
				count = cached.count,
				"Literature id search served from cache."
			);

			return Ok(cached);
		}

		let retmax = max_results.to_string();
		let mut params = vec![
			("db", self.cfg.database.as_str()),
			("term", key.0.as_str()),
			("retmax", retmax.as_str()),
			("retmode", "json"),
		];

		if let Some(api_key) = self.cfg.api_key.as_deref() {
			params.push(("api_key", api_key));
		}

		let json = self.get_json(&self.cfg.search_path, &params).await?;
		let found = parse_id_search(&json)?;

		remember(&mut self.lock_cache(), key, found.clone());

		Ok(found)
	}

	/// Fetches summaries in batches of `batch_size`. A failed batch is logged and skipped.
	pub async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<Article>> {
		let batch_size = (self.cfg.batch_size as usize).max(1);
		let batches = ids.chunks(batch_size).map(|batch| self.fetch_batch(batch));
		let outcomes = futures::future::join_all(batches).await;
		let mut articles = Vec::with_capacity(ids.len());

		for (index, outcome) in outcomes.into_iter().enumerate() {
			match outcome {
				Ok(batch) => articles.extend(batch),
				Err(err) => {
					tracing::warn!(
						error = %err,
						provider_id = %self.cfg.provider_id,
						batch = index,
						"Literature summary batch failed; keeping the other batches."
					);
				},
			}
		}

		Ok(articles)
	}

	async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Article>> {
		let joined = ids.join(",");
		let mut params =
			vec![("db", self.cfg.database.as_str()), ("id", joined.as_str()), ("retmode", "json")];

		if let Some(api_key) = self.cfg.api_key.as_deref() {
			params.push(("api_key", api_key));
		}

		let json = self.get_json(&self.cfg.summary_path, &params).await?;

		parse_summaries(&json, &self.cfg.database)
	}

	async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
		let url = format!("{}{}", self.cfg.api_base, path);
		let max_attempts = self.cfg.max_attempts.max(1);

		for attempt in 1..=max_attempts {
			let res = self.http.get(&url).query(params).send().await?;

			if res.status() == StatusCode::TOO_MANY_REQUESTS {
				let wait = backoff_delay(self.cfg.backoff_base_ms, attempt);

				tracing::warn!(
					provider_id = %self.cfg.provider_id,
					attempt,
					max_attempts,
					wait_ms = wait.as_millis() as u64,
					"Literature API rate limited the request."
				);
				tokio::time::sleep(wait).await;

				continue;
			}

			return Ok(res.error_for_status()?.json().await?);
		}

		Err(Error::RateLimited { attempts: max_attempts })
	}

	fn lock_cache(&self) -> MutexGuard<'_, LruCache<IdCacheKey, IdSearch>> {
		self.id_cache.lock().unwrap_or_else(|err| err.into_inner())
	}
}

// Lookups use `peek`, and a repeated key keeps its slot, so eviction is oldest-inserted-first.
fn remember(cache: &mut LruCache<IdCacheKey, IdSearch>, key: IdCacheKey, found: IdSearch) {
	if !cache.contains(&key) {
		cache.push(key, found);
	}
}

pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
	Duration::from_millis(base_ms.saturating_mul(u64::from(attempt)))
}

fn parse_id_search(json: &Value) -> Result<IdSearch> {
	let result = json.get("esearchresult").ok_or_else(|| Error::InvalidResponse {
		message: "Literature search response is missing esearchresult.".to_string(),
	})?;

	if let Some(message) = result.get("ERROR").and_then(Value::as_str) {
		return Err(Error::InvalidResponse {
			message: format!("Literature search returned an error: {message}"),
		});
	}

	let count = match result.get("count") {
		Some(Value::String(raw)) => raw.parse().unwrap_or(0),
		Some(value) => value.as_u64().unwrap_or(0),
		None => 0,
	};
	let ids = result
		.get("idlist")
		.and_then(Value::as_array)
		.map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
		.unwrap_or_default();

	Ok(IdSearch { count, ids })
}

fn parse_summaries(json: &Value, database: &str) -> Result<Vec<Article>> {
	let result = json.get("result").ok_or_else(|| Error::InvalidResponse {
		message: "Literature summary response is missing result.".to_string(),
	})?;
	let uids = result.get("uids").and_then(Value::as_array).ok_or_else(|| {
		Error::InvalidResponse {
			message: "Literature summary response is missing uids.".to_string(),
		}
	})?;
	let mut articles = Vec::with_capacity(uids.len());

	for uid in uids.iter().filter_map(Value::as_str) {
		let Some(record) = result.get(uid) else {
			tracing::warn!(uid, "Literature summary missing record.");

			continue;
		};

		if record.get("error").is_some() {
			tracing::warn!(uid, "Literature summary record reported an error.");

			continue;
		}

		let title = record.get("title").and_then(Value::as_str).unwrap_or_default().trim();
		let journal = record
			.get("fulljournalname")
			.or_else(|| record.get("source"))
			.and_then(Value::as_str)
			.filter(|value| !value.is_empty())
			.map(str::to_string);
		let published = record
			.get("pubdate")
			.and_then(Value::as_str)
			.filter(|value| !value.is_empty())
			.map(str::to_string);
		let authors = record
			.get("authors")
			.and_then(Value::as_array)
			.map(|list| {
				list.iter()
					.filter_map(|author| author.get("name").and_then(Value::as_str))
					.map(str::to_string)
					.collect()
			})
			.unwrap_or_default();
		let url = (database == "pubmed").then(|| format!("https://pubmed.ncbi.nlm.nih.gov/{uid}/"));

		articles.push(Article {
			id: uid.to_string(),
			title: title.to_string(),
			journal,
			published,
			authors,
			url,
		});
	}

	Ok(articles)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff_grows_linearly() {
		let waits: Vec<u64> =
			(1..=3).map(|attempt| backoff_delay(2_000, attempt).as_millis() as u64).collect();

		assert_eq!(waits, vec![2_000, 4_000, 6_000]);
		assert_eq!(waits.iter().sum::<u64>(), 12_000);
	}

	#[test]
	fn parses_id_search_with_string_count() {
		let json = serde_json::json!({
			"esearchresult": { "count": "1234", "idlist": ["39000001", "39000002"] }
		});
		let found = parse_id_search(&json).expect("parse failed");

		assert_eq!(found.count, 1_234);
		assert_eq!(found.ids, vec!["39000001".to_string(), "39000002".to_string()]);
	}

	#[test]
	fn id_search_error_is_reported() {
		let json = serde_json::json!({ "esearchresult": { "ERROR": "Invalid query" } });
		let err = parse_id_search(&json).expect_err("expected error");

		assert!(err.to_string().contains("Invalid query"));
	}

	#[test]
	fn parses_summaries_in_uid_order_and_skips_errors() {
		let json = serde_json::json!({
			"result": {
				"uids": ["2", "1", "3"],
				"1": { "title": "First", "source": "Kidney Int", "pubdate": "2024 Jan" },
				"2": {
					"title": " Second ",
					"fulljournalname": "Journal of Nephrology",
					"authors": [{ "name": "Doe J" }, { "name": "Roe R" }]
				},
				"3": { "error": "cannot get document summary" }
			}
		});
		let articles = parse_summaries(&json, "pubmed").expect("parse failed");

		assert_eq!(articles.len(), 2);
		assert_eq!(articles[0].id, "2");
		assert_eq!(articles[0].title, "Second");
		assert_eq!(articles[0].journal.as_deref(), Some("Journal of Nephrology"));
		assert_eq!(articles[0].authors, vec!["Doe J".to_string(), "Roe R".to_string()]);
		assert_eq!(articles[1].published.as_deref(), Some("2024 Jan"));
		assert_eq!(articles[1].url.as_deref(), Some("https://pubmed.ncbi.nlm.nih.gov/1/"));
	}

	#[test]
	fn id_cache_evicts_oldest_first() {
		let mut cache = LruCache::new(NonZeroUsize::new(2).expect("non-zero"));
		let found = IdSearch { count: 1, ids: vec!["1".to_string()] };

		remember(&mut cache, ("a".to_string(), 5), found.clone());
		remember(&mut cache, ("b".to_string(), 5), found.clone());
		// Re-remembering and peeking leave "a" the oldest entry.
		remember(&mut cache, ("a".to_string(), 5), found.clone());
		assert!(cache.peek(&("a".to_string(), 5)).is_some());

		remember(&mut cache, ("c".to_string(), 5), found);

		assert!(cache.peek(&("a".to_string(), 5)).is_none());
		assert!(cache.peek(&("b".to_string(), 5)).is_some());
		assert!(cache.peek(&("c".to_string(), 5)).is_some());
	}
}
