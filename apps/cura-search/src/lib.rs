use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cura_service::{CuraService, FusionMode, SearchRequest, SourceSelection};
use cura_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = cura_cli::VERSION,
	rename_all = "kebab",
	styles = cura_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'q', value_name = "TEXT")]
	pub query: String,
	/// Enables a collection with an explicit limit. Repeatable.
	#[arg(long = "collection", value_name = "NAME=LIMIT")]
	pub collections: Vec<CollectionLimit>,
	/// Searches only the collections passed with `--collection`.
	#[arg(long)]
	pub only: bool,
	#[arg(long, conflicts_with = "literature_limit")]
	pub no_literature: bool,
	#[arg(long, value_name = "N")]
	pub literature_limit: Option<u32>,
	#[arg(long)]
	pub keyword_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionLimit {
	pub name: String,
	pub limit: u32,
}
impl FromStr for CollectionLimit {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		let (name, limit) =
			raw.split_once('=').ok_or_else(|| format!("Expected NAME=LIMIT, got {raw:?}."))?;
		let name = name.trim();

		if name.is_empty() {
			return Err("Collection name must be non-empty.".to_string());
		}

		let limit = limit
			.trim()
			.parse()
			.map_err(|err| format!("Invalid limit for collection {name:?}: {err}."))?;

		Ok(Self { name: name.to_string(), limit })
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cura_config::load(&args.config)?;

	init_tracing(&config)?;

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let service = CuraService::new(config, db, qdrant)?;
	let request = apply_args(service.default_request(&args.query), &args);
	let response = service.search_all_sources(request).await?;

	println!("{}", serde_json::to_string_pretty(&response)?);

	Ok(())
}

/// Layers command-line overrides on top of the configured default request.
pub fn apply_args(mut request: SearchRequest, args: &Args) -> SearchRequest {
	if args.only {
		for selection in request.collections.values_mut() {
			selection.enabled = false;
		}
	}

	for CollectionLimit { name, limit } in &args.collections {
		request.collections.insert(name.clone(), SourceSelection { enabled: true, limit: *limit });
	}

	if let Some(limit) = args.literature_limit {
		request.literature = SourceSelection { enabled: true, limit };
	}
	if args.no_literature {
		request.literature.enabled = false;
	}
	if args.keyword_only {
		request.fusion_mode = FusionMode::KeywordOnly;
	}

	request
}

fn init_tracing(config: &cura_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}
