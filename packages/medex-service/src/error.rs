use medex_domain::{
	export::{DownloadError, ExportStatus, RetentionOverflow, TransitionError},
	mail::MailError,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Unauthorized: {message}")]
	Unauthorized { message: String },
	#[error("Forbidden: {message}")]
	Forbidden { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Export is {status}, cannot download.")]
	NotReady { status: ExportStatus },
	#[error("Export link has expired.")]
	Expired,
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error(transparent)]
	InvalidTransition(#[from] TransitionError),
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("I/O error: {message}")]
	Io { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<medex_storage::Error> for Error {
	fn from(err: medex_storage::Error) -> Self {
		match err {
			medex_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			medex_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			medex_storage::Error::NotFound(message) => Self::NotFound { message },
			medex_storage::Error::Conflict(message) => Self::Conflict { message },
			medex_storage::Error::Corrupt(message) => Self::Storage { message },
		}
	}
}
impl From<medex_providers::Error> for Error {
	fn from(err: medex_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io { message: err.to_string() }
	}
}
impl From<DownloadError> for Error {
	fn from(err: DownloadError) -> Self {
		match err {
			DownloadError::Expired => Self::Expired,
			DownloadError::NotReady(status) => Self::NotReady { status },
		}
	}
}
impl From<MailError> for Error {
	fn from(err: MailError) -> Self {
		Self::Internal { message: err.to_string() }
	}
}
impl From<RetentionOverflow> for Error {
	fn from(err: RetentionOverflow) -> Self {
		Self::Internal { message: err.to_string() }
	}
}
