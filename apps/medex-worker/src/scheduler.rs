//! Cron timer for the scheduled jobs.
//!
//! Each registered job gets its own task that sleeps until the next fire time, runs the job
//! and loops. A job never overlaps with itself because its loop is sequential.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use cron::Schedule;
use time::OffsetDateTime;
use tokio::{sync::watch, task::JoinSet};

use medex_service::{BatchReport, BoxFuture, CleanupReport, JobReport, MedexService};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
	DailyReminder,
	MonthlyReport,
	ExportCleanup,
	PendingSweep,
}
impl JobKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::DailyReminder => "daily_reminder",
			Self::MonthlyReport => "monthly_report",
			Self::ExportCleanup => "export_cleanup",
			Self::PendingSweep => "pending_sweep",
		}
	}
}
impl fmt::Display for JobKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSummary {
	Notifications(JobReport),
	Cleanup(CleanupReport),
	Sweep(BatchReport),
}

/// Executes one run of a job. Implemented by [`MedexService`].
pub trait JobHandler
where
	Self: Send + Sync + 'static,
{
	fn run_job(
		&self,
		kind: JobKind,
		now: OffsetDateTime,
	) -> BoxFuture<'_, medex_service::Result<JobSummary>>;
}
impl JobHandler for MedexService {
	fn run_job(
		&self,
		kind: JobKind,
		now: OffsetDateTime,
	) -> BoxFuture<'_, medex_service::Result<JobSummary>> {
		Box::pin(async move {
			match kind {
				JobKind::DailyReminder =>
					self.send_daily_reminders(now.date()).await.map(JobSummary::Notifications),
				JobKind::MonthlyReport =>
					self.send_monthly_reports(now.date(), now).await.map(JobSummary::Notifications),
				JobKind::ExportCleanup =>
					self.cleanup_expired_exports(now).await.map(JobSummary::Cleanup),
				JobKind::PendingSweep => self.process_all_pending().await.map(JobSummary::Sweep),
			}
		})
	}
}

#[derive(Debug, Clone)]
pub struct JobInfo {
	pub kind: JobKind,
	pub expression: String,
	pub next_fire: Option<DateTime<Utc>>,
}

struct RegisteredJob {
	kind: JobKind,
	expression: String,
	schedule: Schedule,
}

pub struct JobRunner<H>
where
	H: JobHandler + ?Sized,
{
	handler: Arc<H>,
	jobs: Vec<RegisteredJob>,
}
impl<H> JobRunner<H>
where
	H: JobHandler + ?Sized,
{
	pub fn new(handler: Arc<H>) -> Self {
		Self { handler, jobs: Vec::new() }
	}

	/// Adds a job on a seconds-first cron expression. An empty expression leaves the job
	/// disabled.
	pub fn register(&mut self, kind: JobKind, expression: &str) -> Result<()> {
		let expression = expression.trim();

		if expression.is_empty() {
			tracing::info!(job = %kind, "Job disabled.");

			return Ok(());
		}
		if self.jobs.iter().any(|job| job.kind == kind) {
			return Err(Error::Validation(format!("Job {kind} is already registered.")));
		}

		let schedule = Schedule::from_str(expression)
			.map_err(|err| Error::InvalidCron { job: kind, source: err })?;

		self.jobs.push(RegisteredJob { kind, expression: expression.to_string(), schedule });

		Ok(())
	}

	pub fn jobs(&self) -> Vec<JobInfo> {
		let now = Utc::now();

		self.jobs
			.iter()
			.map(|job| JobInfo {
				kind: job.kind,
				expression: job.expression.clone(),
				next_fire: next_fire(&job.schedule, now),
			})
			.collect()
	}

	/// Drives every registered job until `shutdown` flips to `true` or its sender is dropped.
	pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
		let mut tasks = JoinSet::new();

		for job in self.jobs {
			tasks.spawn(run_job_loop(self.handler.clone(), job, shutdown.clone()));
		}

		while let Some(joined) = tasks.join_next().await {
			joined?;
		}

		tracing::info!("Job runner stopped.");

		Ok(())
	}
}

/// The first fire time strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
	schedule.after(&after).next()
}

async fn run_job_loop<H>(handler: Arc<H>, job: RegisteredJob, mut shutdown: watch::Receiver<bool>)
where
	H: JobHandler + ?Sized,
{
	loop {
		if *shutdown.borrow() {
			break;
		}

		let now = Utc::now();
		let Some(fire_at) = next_fire(&job.schedule, now) else {
			tracing::warn!(job = %job.kind, "Schedule has no future fire time.");

			break;
		};
		let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);

		tokio::select! {
			_ = tokio::time::sleep(wait) => {},
			_ = shutdown.changed() => break,
		}

		let started = std::time::Instant::now();

		match handler.run_job(job.kind, OffsetDateTime::now_utc()).await {
			Ok(summary) => tracing::info!(
				job = %job.kind,
				elapsed_ms = started.elapsed().as_millis() as u64,
				?summary,
				"Job run finished."
			),
			Err(err) => tracing::error!(job = %job.kind, error = %err, "Job run failed."),
		}
	}

	tracing::debug!(job = %job.kind, "Job loop exited.");
}
