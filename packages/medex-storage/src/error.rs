#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Corrupt row: {0}")]
	Corrupt(String),
}
impl From<medex_domain::export::ParseError> for Error {
	fn from(err: medex_domain::export::ParseError) -> Self {
		Self::Corrupt(err.to_string())
	}
}
