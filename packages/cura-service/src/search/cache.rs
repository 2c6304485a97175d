use std::{
	collections::BTreeMap,
	sync::{Mutex, MutexGuard},
	time::{Duration, Instant},
};

use lru::LruCache;
use serde_json::Value;

use crate::{
	Error, Result,
	search::{SearchRequest, SearchResponse, SourceSelection},
};

const SEARCH_CACHE_SCHEMA_VERSION: i32 = 1;

pub fn hash_cache_key(payload: &Value) -> Result<String> {
	let raw = serde_json::to_vec(payload).map_err(|err| Error::Storage {
		message: format!("Failed to encode cache key payload: {err}"),
	})?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

pub fn cache_key_prefix(key: &str) -> &str {
	let len = key.len().min(12);

	&key[..len]
}

/// Derives the result cache key from every field that can change the response.
///
/// `collections` must already hold every configured collection so that an omitted and an
/// explicitly disabled collection hash the same.
pub fn build_search_cache_key(request: &SearchRequest) -> Result<String> {
	let collections: BTreeMap<&str, Value> = request
		.collections
		.iter()
		.map(|(name, selection)| (name.as_str(), selection_signature(selection)))
		.collect();
	let payload = serde_json::json!({
		"kind": "search",
		"schema_version": SEARCH_CACHE_SCHEMA_VERSION,
		"query": request.query.trim(),
		"fusion_mode": request.fusion_mode,
		"collections": collections,
		"literature": selection_signature(&request.literature),
	});

	hash_cache_key(&payload)
}

// Disabled sources hash the same whatever limit they carry.
fn selection_signature(selection: &SourceSelection) -> Value {
	let limit = if selection.enabled { selection.limit } else { 0 };

	serde_json::json!({ "enabled": selection.enabled, "limit": limit })
}

/// In-memory store of complete search responses.
///
/// Entries expire after their TTL. Once the entry count exceeds `max_entries`, the oldest
/// `ceil(len * eviction_fraction)` entries by insertion are dropped in one pass. Reads use
/// `peek`, so only a write moves an entry to the young end.
pub struct ResultCache {
	entries: Mutex<LruCache<String, CacheEntry>>,
	ttl: Duration,
	max_entries: usize,
	eviction_fraction: f32,
}
impl ResultCache {
	pub fn new(ttl: Duration, max_entries: usize, eviction_fraction: f32) -> Self {
		Self {
			entries: Mutex::new(LruCache::unbounded()),
			ttl,
			max_entries: max_entries.max(1),
			eviction_fraction: if eviction_fraction > 0.0 { eviction_fraction.min(1.0) } else { 1.0 },
		}
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn get(&self, key: &str) -> Option<SearchResponse> {
		let mut entries = self.lock();
		let entry = entries.peek(key)?;

		if entry.inserted_at.elapsed() < entry.ttl {
			return Some(entry.response.clone());
		}

		entries.pop(key);

		None
	}

	pub fn put(&self, key: String, response: SearchResponse) {
		self.put_with_ttl(key, response, self.ttl);
	}

	/// Stores `response` under `key`, replacing any previous entry.
	pub fn put_with_ttl(&self, key: String, response: SearchResponse, ttl: Duration) {
		let mut entries = self.lock();

		entries.put(key, CacheEntry { response, inserted_at: Instant::now(), ttl });

		if entries.len() > self.max_entries {
			let evicted = evict_oldest(&mut entries, self.eviction_fraction);

			tracing::debug!(
				evicted,
				remaining = entries.len(),
				"Search result cache evicted oldest entries."
			);
		}
	}

	fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}

struct CacheEntry {
	response: SearchResponse,
	inserted_at: Instant,
	ttl: Duration,
}

fn evict_oldest(entries: &mut LruCache<String, CacheEntry>, fraction: f32) -> usize {
	let count = ((entries.len() as f32 * fraction).ceil() as usize).clamp(1, entries.len());

	for _ in 0..count {
		entries.pop_lru();
	}

	count
}
