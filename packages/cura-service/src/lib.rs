pub mod embedding_cache;
pub mod search;
pub mod time_serde;

mod error;

pub use cura_providers::literature::Article;
pub use error::{Error, Result};
pub use search::{
	CollectionResults, FusionMode, MergedHit, SearchRequest, SearchResponse, SourceHit,
	SourceOrigin, SourceSelection,
};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use cura_config::{Config, EmbeddingProviderConfig};
use cura_providers::{embedding, literature::LiteratureClient};
use cura_storage::{db::Db, documents, qdrant::QdrantStore};

use crate::{embedding_cache::EmbeddingCache, search::cache::ResultCache};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Full-text document store, one logical collection per call.
pub trait KeywordStore
where
	Self: Send + Sync,
{
	fn search_text<'a>(
		&'a self,
		collection: &'a str,
		query: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<SourceHit>>>;
}

/// Nearest-neighbor index. Scores are cosine similarities in `[0, 1]`.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		namespace: &'a str,
		embedding: &'a [f32],
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<SourceHit>>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait LiteratureProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		query: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, Result<Vec<Article>>>;
}

#[derive(Clone)]
pub struct Backends {
	pub keyword: Arc<dyn KeywordStore>,
	pub vector: Arc<dyn VectorIndex>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub literature: Arc<dyn LiteratureProvider>,
}
impl Backends {
	pub fn new(
		keyword: Arc<dyn KeywordStore>,
		vector: Arc<dyn VectorIndex>,
		embedding: Arc<dyn EmbeddingProvider>,
		literature: Arc<dyn LiteratureProvider>,
	) -> Self {
		Self { keyword, vector, embedding, literature }
	}
}

pub struct CuraService {
	pub cfg: Config,
	pub backends: Backends,
	embedding_cache: Arc<EmbeddingCache>,
	result_cache: ResultCache,
}
impl CuraService {
	/// Wires the Postgres, Qdrant, embedding and literature clients named in `cfg`.
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Result<Self> {
		let literature = LiteratureClient::new(&cfg.providers.literature)?;
		let backends = Backends::new(
			Arc::new(db),
			Arc::new(qdrant),
			Arc::new(DefaultEmbedding),
			Arc::new(literature),
		);

		Ok(Self::with_backends(cfg, backends))
	}

	pub fn with_backends(cfg: Config, backends: Backends) -> Self {
		let embedding_cache = Arc::new(EmbeddingCache::new(
			cfg.search.embedding_cache.max_entries as usize,
			cfg.storage.qdrant.vector_dim as usize,
		));
		let result_cache = ResultCache::new(
			Duration::from_secs(cfg.search.cache.ttl_secs),
			cfg.search.cache.max_entries as usize,
			cfg.search.cache.eviction_fraction,
		);

		Self { cfg, backends, embedding_cache, result_cache }
	}

	pub fn embedding_cache(&self) -> &EmbeddingCache {
		&self.embedding_cache
	}

	pub fn result_cache(&self) -> &ResultCache {
		&self.result_cache
	}
}

struct DefaultEmbedding;
impl EmbeddingProvider for DefaultEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

impl KeywordStore for Db {
	fn search_text<'a>(
		&'a self,
		collection: &'a str,
		query: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<SourceHit>>> {
		Box::pin(async move {
			let rows = documents::search_text(&self.pool, collection, query, limit).await?;

			Ok(rows
				.into_iter()
				.map(|row| SourceHit {
					id: row.doc_id,
					score: row.score,
					payload: serde_json::json!({
						"title": row.title,
						"snippet": row.snippet,
						"metadata": row.metadata,
					}),
					origin: SourceOrigin::Keyword,
				})
				.collect())
		})
	}
}

impl VectorIndex for QdrantStore {
	fn query<'a>(
		&'a self,
		namespace: &'a str,
		embedding: &'a [f32],
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<SourceHit>>> {
		Box::pin(async move {
			let matches = self.query_namespace(namespace, embedding, top_k).await?;

			Ok(matches
				.into_iter()
				.map(|hit| SourceHit {
					id: hit.id,
					score: hit.similarity,
					payload: hit.payload,
					origin: SourceOrigin::Vector,
				})
				.collect())
		})
	}
}

impl LiteratureProvider for LiteratureClient {
	fn search<'a>(
		&'a self,
		query: &'a str,
		max_results: u32,
	) -> BoxFuture<'a, Result<Vec<Article>>> {
		Box::pin(async move { Ok(LiteratureClient::search(self, query, max_results).await?) })
	}
}
