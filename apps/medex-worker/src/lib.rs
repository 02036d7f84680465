pub mod error;
pub mod scheduler;

pub use error::{Error, Result};
pub use medex_cli::Args;

use std::sync::Arc;

use tokio::sync::watch;

use medex_service::MedexService;
use medex_storage::db::Db;

use crate::scheduler::{JobKind, JobRunner};

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = medex_config::load(&args.config)?;

	medex_cli::init_tracing(&config.service.log_level);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let service = Arc::new(MedexService::new(config, db)?);
	let mut runner = JobRunner::new(service.clone());
	let jobs = &service.cfg.jobs;

	runner.register(JobKind::DailyReminder, &jobs.daily_reminder)?;
	runner.register(JobKind::MonthlyReport, &jobs.monthly_report)?;
	runner.register(JobKind::ExportCleanup, &jobs.export_cleanup)?;
	runner.register(JobKind::PendingSweep, &jobs.pending_sweep)?;

	for job in runner.jobs() {
		tracing::info!(job = %job.kind, expression = %job.expression, next_fire = ?job.next_fire, "Job scheduled.");
	}

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let runner_task = tokio::spawn(runner.run(shutdown_rx));

	tokio::signal::ctrl_c().await?;

	tracing::info!("Shutdown requested; stopping job loops.");

	let _ = shutdown_tx.send(true);

	runner_task.await??;

	Ok(())
}
