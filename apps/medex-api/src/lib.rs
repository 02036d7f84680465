pub mod routes;
pub mod state;

pub use medex_cli::Args;

use std::net::SocketAddr;

use color_eyre::eyre;
use tokio::net::TcpListener;

use crate::state::AppState;

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = medex_config::load(&args.config)?;

	medex_cli::init_tracing(&config.service.log_level);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;

	if config.security.bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}

	let state = AppState::new(config).await?;
	let app = routes::router(state.clone());
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(http_listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	tracing::info!("HTTP server stopped; draining export queue.");

	let stats = state.queue.shutdown().await;

	tracing::info!(?stats, "Shutdown complete.");

	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for shutdown signal.");
	}
}
