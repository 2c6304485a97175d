pub mod cache;
pub mod fusion;
pub mod sources;

use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use futures::{
	FutureExt,
	future::{self, Shared},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use cura_config::{Collection, SearchFusion};

use crate::{
	Backends, BoxFuture, CuraService, Error, Result,
	search::sources::{SourceAdapter, SourceQuery},
};

type SharedEmbedding = Shared<BoxFuture<'static, Option<Arc<Vec<f32>>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
	Hybrid,
	KeywordOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrigin {
	Keyword,
	Vector,
	Literature,
}

/// One hit as a source reported it. `score` is on the source's own scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHit {
	pub id: String,
	pub score: f32,
	pub payload: Value,
	pub origin: SourceOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedHit {
	pub id: String,
	pub keyword_score: f32,
	pub semantic_score: f32,
	pub found_in_both: bool,
	pub final_score: f32,
	pub metadata: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSelection {
	pub enabled: bool,
	pub limit: u32,
}

/// One orchestrated search. Collections missing from `collections` are not searched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	pub collections: BTreeMap<String, SourceSelection>,
	pub literature: SourceSelection,
	pub fusion_mode: FusionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionResults {
	pub enabled: bool,
	/// Mode actually used; `keyword_only` when no query embedding was available.
	pub fusion_mode: FusionMode,
	pub hits: Vec<MergedHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
	pub query: String,
	pub fusion_mode: FusionMode,
	pub collections: BTreeMap<String, CollectionResults>,
	pub literature: Vec<SourceHit>,
	pub search_time_ms: f64,
	#[serde(with = "crate::time_serde")]
	pub searched_at: OffsetDateTime,
}

struct CollectionTask {
	backends: Backends,
	fusion: SearchFusion,
	collection: Collection,
	query: String,
	limit: u32,
	embedding: Option<SharedEmbedding>,
}

impl CuraService {
	/// Every configured collection at its default limit, literature per configuration, hybrid.
	pub fn default_request(&self, query: &str) -> SearchRequest {
		let collections = self
			.cfg
			.collections
			.iter()
			.map(|collection| {
				(
					collection.name.clone(),
					SourceSelection { enabled: collection.enabled, limit: collection.default_limit },
				)
			})
			.collect();

		SearchRequest {
			query: query.to_string(),
			collections,
			literature: SourceSelection {
				enabled: self.cfg.search.literature.enabled,
				limit: self.cfg.search.literature.default_limit,
			},
			fusion_mode: FusionMode::Hybrid,
		}
	}

	/// Searches every enabled source concurrently and fuses keyword and vector hits per
	/// collection.
	///
	/// Only request validation fails the call. A failing source contributes no hits, and a
	/// missing query embedding downgrades the affected collections to keyword-only fusion.
	pub async fn search_all_sources(&self, request: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let request = self.resolve_request(request)?;
		let cache_key = self.result_cache_key(&request);

		if let Some(key) = cache_key.as_deref() {
			if let Some(cached) = self.result_cache.get(key) {
				tracing::debug!(
					cache_key_prefix = cache::cache_key_prefix(key),
					hit = true,
					"Search result cache lookup."
				);

				return Ok(cached);
			}

			tracing::debug!(
				cache_key_prefix = cache::cache_key_prefix(key),
				hit = false,
				"Search result cache lookup."
			);
		}

		let embedding = self.shared_query_embedding(&request);
		let mut collections = BTreeMap::new();
		let mut pending: Vec<(String, JoinHandle<CollectionResults>)> = Vec::new();

		for (name, selection) in &request.collections {
			let Some(collection) = self.cfg.collection(name).filter(|_| selection.enabled) else {
				collections.insert(
					name.clone(),
					CollectionResults {
						enabled: false,
						fusion_mode: request.fusion_mode,
						hits: Vec::new(),
					},
				);

				continue;
			};
			let task = CollectionTask {
				backends: self.backends.clone(),
				fusion: self.cfg.search.fusion.clone(),
				collection: collection.clone(),
				query: request.query.clone(),
				limit: selection.limit,
				embedding: embedding.clone(),
			};

			pending.push((name.clone(), tokio::spawn(search_collection(task))));
		}

		let literature = request.literature.enabled.then(|| {
			tokio::spawn(search_literature(
				self.backends.clone(),
				request.query.clone(),
				request.literature.limit,
			))
		});
		let collect_collections = future::join_all(
			pending.into_iter().map(|(name, handle)| async move { (name, handle.await) }),
		);
		let collect_literature = async move {
			match literature {
				Some(handle) => handle.await.unwrap_or_else(|err| {
					tracing::warn!(error = %err, "Literature task aborted; using no hits.");

					Vec::new()
				}),
				None => Vec::new(),
			}
		};
		let (finished, literature) = tokio::join!(collect_collections, collect_literature);

		for (name, outcome) in finished {
			let results = outcome.unwrap_or_else(|err| {
				tracing::warn!(
					error = %err,
					collection = %name,
					"Collection task aborted; using no hits."
				);

				CollectionResults {
					enabled: true,
					fusion_mode: request.fusion_mode,
					hits: Vec::new(),
				}
			});

			collections.insert(name, results);
		}

		let response = SearchResponse {
			query: request.query.clone(),
			fusion_mode: request.fusion_mode,
			collections,
			literature,
			search_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
			searched_at: OffsetDateTime::now_utc(),
		};

		tracing::info!(
			query_chars = response.query.chars().count(),
			collections = response.collections.values().filter(|results| results.enabled).count(),
			hits = response.collections.values().map(|results| results.hits.len()).sum::<usize>(),
			literature_hits = response.literature.len(),
			elapsed_ms = response.search_time_ms,
			"Search completed."
		);

		if let Some(key) = cache_key {
			self.result_cache.put(key, response.clone());
		}

		Ok(response)
	}

	/// Validates `request` and lists every configured collection, omitted ones as disabled.
	fn resolve_request(&self, request: SearchRequest) -> Result<SearchRequest> {
		let search = &self.cfg.search;
		let query = request.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}
		if query.chars().count() > search.max_query_chars as usize {
			return Err(Error::InvalidRequest {
				message: format!("query must be at most {} characters.", search.max_query_chars),
			});
		}

		for name in request.collections.keys() {
			if self.cfg.collection(name).is_none() {
				return Err(Error::InvalidRequest {
					message: format!("Unknown collection {name:?}."),
				});
			}
		}

		let mut collections = BTreeMap::new();

		for collection in &self.cfg.collections {
			let selection = request.collections.get(&collection.name).copied().unwrap_or_default();

			if selection.enabled {
				validate_limit(&collection.name, selection.limit, search.max_limit)?;
			}

			collections.insert(collection.name.clone(), selection);
		}

		if request.literature.enabled {
			validate_limit("literature", request.literature.limit, search.max_limit)?;
		}

		Ok(SearchRequest {
			query: query.to_string(),
			collections,
			literature: request.literature,
			fusion_mode: request.fusion_mode,
		})
	}

	fn result_cache_key(&self, request: &SearchRequest) -> Option<String> {
		if !self.cfg.search.cache.enabled {
			return None;
		}

		match cache::build_search_cache_key(request) {
			Ok(key) => Some(key),
			Err(err) => {
				tracing::warn!(error = %err, "Failed to build search cache key; skipping cache.");

				None
			},
		}
	}

	/// One lazily computed embedding shared by every collection task of this request.
	fn shared_query_embedding(&self, request: &SearchRequest) -> Option<SharedEmbedding> {
		if request.fusion_mode != FusionMode::Hybrid
			|| !request.collections.values().any(|selection| selection.enabled)
		{
			return None;
		}

		let cache = self.embedding_cache.clone();
		let provider = self.backends.embedding.clone();
		let cfg = self.cfg.providers.embedding.clone();
		let text = request.query.clone();
		// Every collection task polls this future, so a provider panic must stop here.
		let compute: BoxFuture<'static, Option<Arc<Vec<f32>>>> = Box::pin(async move {
			let outcome =
				AssertUnwindSafe(cache.get_or_compute(provider.as_ref(), &cfg, &text))
					.catch_unwind()
					.await;

			match outcome {
				Ok(Ok(vector)) => Some(vector),
				Ok(Err(err)) => {
					tracing::warn!(
						error = %err,
						"Query embedding unavailable; falling back to keyword-only fusion."
					);

					None
				},
				Err(_) => {
					tracing::warn!(
						"Query embedding panicked; falling back to keyword-only fusion."
					);

					None
				},
			}
		});

		Some(compute.shared())
	}
}

fn validate_limit(source: &str, limit: u32, max_limit: u32) -> Result<()> {
	if limit == 0 || limit > max_limit {
		return Err(Error::InvalidRequest {
			message: format!("{source} limit must be between 1 and {max_limit}."),
		});
	}

	Ok(())
}

async fn search_collection(task: CollectionTask) -> CollectionResults {
	let CollectionTask { backends, fusion, collection, query, limit, embedding } = task;
	let keyword = SourceAdapter::Keyword {
		store: backends.keyword.as_ref(),
		collection: &collection.keyword_collection,
	};
	let vector = SourceAdapter::Vector {
		index: backends.vector.as_ref(),
		namespace: &collection.vector_namespace,
	};
	let keyword_query = SourceQuery { text: &query, embedding: None, limit };
	let keyword_lookup = keyword.search(&keyword_query);
	let vector_lookup = async {
		let vector_query = match embedding {
			Some(shared) => shared.await?,
			None => return None,
		};

		Some(
			vector
				.search(&SourceQuery {
					text: &query,
					embedding: Some(vector_query.as_slice()),
					limit,
				})
				.await,
		)
	};
	let (keyword_hits, vector_hits) = tokio::join!(keyword_lookup, vector_lookup);
	let (fusion_mode, vector_hits) = match vector_hits {
		Some(hits) => (FusionMode::Hybrid, hits),
		None => (FusionMode::KeywordOnly, Vec::new()),
	};
	let hits = fusion::fuse(
		&keyword_hits,
		&vector_hits,
		&fusion,
		&collection.passage_separator,
		limit as usize,
	);

	tracing::debug!(
		collection = %collection.name,
		?fusion_mode,
		keyword_hits = keyword_hits.len(),
		vector_hits = vector_hits.len(),
		merged = hits.len(),
		"Collection fused."
	);

	CollectionResults { enabled: true, fusion_mode, hits }
}

async fn search_literature(backends: Backends, query: String, limit: u32) -> Vec<SourceHit> {
	let adapter = SourceAdapter::Literature { provider: backends.literature.as_ref() };

	adapter.search(&SourceQuery { text: &query, embedding: None, limit }).await
}
