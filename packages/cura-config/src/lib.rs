mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Collection, Config, EmbeddingCache, EmbeddingProviderConfig, LiteratureProviderConfig,
	Postgres, Providers, Qdrant, Search, SearchCache, SearchFusion, SearchLiterature, Service,
	Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty.".to_string(),
		});
	}

	let literature = &cfg.providers.literature;

	if literature.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.literature.api_base must be non-empty.".to_string(),
		});
	}
	if literature.batch_size == 0 {
		return Err(Error::Validation {
			message: "providers.literature.batch_size must be greater than zero.".to_string(),
		});
	}
	if literature.max_attempts == 0 {
		return Err(Error::Validation {
			message: "providers.literature.max_attempts must be greater than zero.".to_string(),
		});
	}
	if literature.id_cache_max_entries == 0 {
		return Err(Error::Validation {
			message: "providers.literature.id_cache_max_entries must be greater than zero."
				.to_string(),
		});
	}
	if cfg.search.max_query_chars == 0 {
		return Err(Error::Validation {
			message: "search.max_query_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_limit == 0 {
		return Err(Error::Validation {
			message: "search.max_limit must be greater than zero.".to_string(),
		});
	}

	validate_collections(cfg)?;

	if cfg.search.literature.default_limit == 0
		|| cfg.search.literature.default_limit > cfg.search.max_limit
	{
		return Err(Error::Validation {
			message: "search.literature.default_limit must be between 1 and search.max_limit."
				.to_string(),
		});
	}

	validate_fusion(&cfg.search.fusion)?;

	if cfg.search.cache.ttl_secs == 0 {
		return Err(Error::Validation {
			message: "search.cache.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.search.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "search.cache.max_entries must be greater than zero.".to_string(),
		});
	}

	let fraction = cfg.search.cache.eviction_fraction;

	if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
		return Err(Error::Validation {
			message: "search.cache.eviction_fraction must be in the range (0.0, 1.0].".to_string(),
		});
	}
	if cfg.search.embedding_cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "search.embedding_cache.max_entries must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_collections(cfg: &Config) -> Result<()> {
	if cfg.collections.is_empty() {
		return Err(Error::Validation {
			message: "At least one [[collections]] entry is required.".to_string(),
		});
	}

	let mut seen = HashSet::new();

	for collection in &cfg.collections {
		let name = collection.name.trim();

		if name.is_empty() {
			return Err(Error::Validation {
				message: "collections.name must be non-empty.".to_string(),
			});
		}
		if !seen.insert(name) {
			return Err(Error::Validation {
				message: format!("collections.name {name:?} is declared more than once."),
			});
		}
		if collection.keyword_collection.trim().is_empty()
			|| collection.vector_namespace.trim().is_empty()
		{
			return Err(Error::Validation {
				message: format!(
					"Collection {name:?} must set keyword_collection and vector_namespace."
				),
			});
		}
		if collection.default_limit == 0 || collection.default_limit > cfg.search.max_limit {
			return Err(Error::Validation {
				message: format!(
					"Collection {name:?} default_limit must be between 1 and search.max_limit."
				),
			});
		}
		if collection.passage_separator.is_empty() {
			return Err(Error::Validation {
				message: format!("Collection {name:?} passage_separator must be non-empty."),
			});
		}
	}

	Ok(())
}

fn validate_fusion(fusion: &SearchFusion) -> Result<()> {
	for (label, weight) in [
		("both_keyword_weight", fusion.both_keyword_weight),
		("both_semantic_weight", fusion.both_semantic_weight),
		("intersection_bonus", fusion.intersection_bonus),
		("single_keyword_weight", fusion.single_keyword_weight),
		("single_semantic_weight", fusion.single_semantic_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation {
				message: format!("search.fusion.{label} must be a finite number."),
			});
		}
		if weight < 0.0 {
			return Err(Error::Validation {
				message: format!("search.fusion.{label} must be zero or greater."),
			});
		}
	}

	if !(0.0..=1.0).contains(&fusion.keyword_min_ratio) {
		return Err(Error::Validation {
			message: "search.fusion.keyword_min_ratio must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.providers.literature.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false)
	{
		cfg.providers.literature.api_key = None;
	}

	for api_base in
		[&mut cfg.providers.embedding.api_base, &mut cfg.providers.literature.api_base]
	{
		let trimmed = api_base.trim().trim_end_matches('/').to_string();

		*api_base = trimmed;
	}
	for collection in &mut cfg.collections {
		collection.name = collection.name.trim().to_string();
	}
}
