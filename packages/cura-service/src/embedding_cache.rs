//! Bounded text-to-vector memo shared by every vector lookup of a query.

use std::{
	num::NonZeroUsize,
	sync::{Arc, Mutex, MutexGuard},
};

use lru::LruCache;

use cura_config::EmbeddingProviderConfig;

use crate::{EmbeddingProvider, Error, Result};

/// Reads go through `peek`, so capacity eviction drops the oldest inserted text.
pub struct EmbeddingCache {
	vectors: Mutex<LruCache<String, Arc<Vec<f32>>>>,
	dimensions: usize,
}
impl EmbeddingCache {
	pub fn new(max_entries: usize, dimensions: usize) -> Self {
		let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);

		Self { vectors: Mutex::new(LruCache::new(capacity)), dimensions }
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn get(&self, text: &str) -> Option<Arc<Vec<f32>>> {
		self.lock().peek(text).cloned()
	}

	/// Returns the cached vector for `text`, or embeds it once and stores the result.
	///
	/// Provider failures and vectors of the wrong length surface as
	/// [`Error::EmbeddingUnavailable`] and are never cached.
	pub async fn get_or_compute(
		&self,
		provider: &dyn EmbeddingProvider,
		cfg: &EmbeddingProviderConfig,
		text: &str,
	) -> Result<Arc<Vec<f32>>> {
		if text.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "Embedding input must be non-empty.".to_string(),
			});
		}
		if let Some(vector) = self.get(text) {
			tracing::debug!(hit = true, "Embedding cache lookup.");

			return Ok(vector);
		}

		tracing::debug!(hit = false, "Embedding cache lookup.");

		let vectors = provider
			.embed(cfg, &[text.to_string()])
			.await
			.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.dimensions {
			return Err(Error::EmbeddingUnavailable {
				message: format!(
					"Embedding has {} dimensions; expected {}.",
					vector.len(),
					self.dimensions
				),
			});
		}

		let vector = Arc::new(vector);

		{
			let mut cached = self.lock();

			// A concurrent miss for the same text keeps its original slot.
			if !cached.contains(text) {
				cached.push(text.to_string(), vector.clone());
			}
		}

		Ok(vector)
	}

	fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<Vec<f32>>>> {
		self.vectors.lock().unwrap_or_else(|err| err.into_inner())
	}
}
