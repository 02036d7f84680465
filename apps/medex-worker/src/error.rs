use crate::scheduler::JobKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Validation(String),
	#[error("Invalid cron expression for {job}: {source}")]
	InvalidCron { job: JobKind, source: cron::error::Error },
	#[error("Job task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}
