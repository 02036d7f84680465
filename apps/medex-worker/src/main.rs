use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = medex_worker::Args::parse();

	medex_worker::run(args).await
}
