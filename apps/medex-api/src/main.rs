use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = medex_api::Args::parse();

	medex_api::run(args).await
}
