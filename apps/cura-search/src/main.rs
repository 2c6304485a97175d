use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = cura_search::Args::parse();

	cura_search::run(args).await
}
