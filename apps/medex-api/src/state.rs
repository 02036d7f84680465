use std::sync::Arc;

use medex_service::{ExportQueue, MedexService};
use medex_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<MedexService>,
	pub queue: Arc<ExportQueue>,
}
impl AppState {
	pub async fn new(config: medex_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		Ok(Self::from_service(Arc::new(MedexService::new(config, db)?)))
	}

	/// Starts the export queue on top of an existing service. Must run inside a Tokio runtime.
	pub fn from_service(service: Arc<MedexService>) -> Self {
		let queue = ExportQueue::start(
			service.clone(),
			service.cfg.exports.workers,
			service.cfg.exports.queue_capacity,
		);

		Self { service, queue: Arc::new(queue) }
	}
}
