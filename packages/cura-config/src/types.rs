use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub collections: Vec<Collection>,
	pub search: Search,
}
impl Config {
	pub fn collection(&self, name: &str) -> Option<&Collection> {
		self.collections.iter().find(|collection| collection.name == name)
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	/// Single Qdrant collection holding every namespace; namespaces are a payload partition.
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub literature: LiteratureProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiteratureProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	/// Identifier search endpoint, e.g. "/esearch.fcgi".
	pub search_path: String,
	/// Batched detail endpoint, e.g. "/esummary.fcgi".
	pub summary_path: String,
	pub database: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	pub batch_size: u32,
	/// Requests issued per call before an HTTP 429 streak is treated as exhausted.
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	/// Linear backoff unit; the wait after attempt `n` is `backoff_base_ms * n`.
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
	#[serde(default = "default_id_cache_max_entries")]
	pub id_cache_max_entries: u32,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
	pub name: String,
	/// Value of `documents.collection` in the keyword store.
	pub keyword_collection: String,
	/// Value of the `namespace` payload field in the vector index.
	pub vector_namespace: String,
	pub default_limit: u32,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_passage_separator")]
	pub passage_separator: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	pub max_query_chars: u32,
	pub max_limit: u32,
	pub literature: SearchLiterature,
	#[serde(default)]
	pub fusion: SearchFusion,
	pub cache: SearchCache,
	pub embedding_cache: EmbeddingCache,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchLiterature {
	pub enabled: bool,
	pub default_limit: u32,
}

/// Fusion weights. The defaults reproduce the shipped ranking; they are empirical, not derived.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchFusion {
	pub both_keyword_weight: f32,
	pub both_semantic_weight: f32,
	pub intersection_bonus: f32,
	pub single_keyword_weight: f32,
	pub single_semantic_weight: f32,
	/// Normalized keyword scores below this ratio are dropped before merging. Zero disables it.
	pub keyword_min_ratio: f32,
}
impl Default for SearchFusion {
	fn default() -> Self {
		Self {
			both_keyword_weight: 0.3,
			both_semantic_weight: 0.5,
			intersection_bonus: 0.2,
			single_keyword_weight: 0.4,
			single_semantic_weight: 0.6,
			keyword_min_ratio: 0.0,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCache {
	pub enabled: bool,
	pub ttl_secs: u64,
	pub max_entries: u32,
	#[serde(default = "default_eviction_fraction")]
	pub eviction_fraction: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingCache {
	pub max_entries: u32,
}

fn default_true() -> bool {
	true
}

fn default_passage_separator() -> String {
	"#".to_string()
}

fn default_max_attempts() -> u32 {
	3
}

fn default_backoff_base_ms() -> u64 {
	2_000
}

fn default_id_cache_max_entries() -> u32 {
	512
}

fn default_eviction_fraction() -> f32 {
	0.2
}
