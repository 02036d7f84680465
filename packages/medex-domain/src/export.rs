//! Export Record lifecycle.
//!
//! A record moves `pending -> processing -> completed | failed` and never back. The file
//! location exists only on completed records and the error text only on failed ones.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub const DEFAULT_RETENTION_DAYS: i64 = 7;
/// Width of the persisted error column.
pub const MAX_ERROR_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
	Pending,
	Processing,
	Completed,
	Failed,
}
impl ExportStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}
impl fmt::Display for ExportStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for ExportStatus {
	type Err = ParseError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			other => Err(ParseError { field: "status", value: other.to_string() }),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
	Csv,
}
impl ExportKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Csv => "csv",
		}
	}

	pub fn extension(self) -> &'static str {
		match self {
			Self::Csv => "csv",
		}
	}

	pub fn content_type(self) -> &'static str {
		match self {
			Self::Csv => "text/csv",
		}
	}

	/// Label used in notification copy.
	pub fn label(self) -> &'static str {
		match self {
			Self::Csv => "CSV",
		}
	}
}
impl fmt::Display for ExportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for ExportKind {
	type Err = ParseError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"csv" => Ok(Self::Csv),
			other => Err(ParseError { field: "export_kind", value: other.to_string() }),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {field} value {value:?}.")]
pub struct ParseError {
	pub field: &'static str,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
	#[error("Cannot move export from {from} to {to}.")]
	InvalidTransition { from: ExportStatus, to: ExportStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DownloadError {
	#[error("Export link has expired.")]
	Expired,
	#[error("Export is {0}, cannot download.")]
	NotReady(ExportStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("A retention of {days} days puts the expiry out of range.")]
pub struct RetentionOverflow {
	pub days: i64,
}

/// Payload for a freshly requested export; the store assigns the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExport {
	pub patient_id: i64,
	pub kind: ExportKind,
	pub status: ExportStatus,
	pub created_at: OffsetDateTime,
	pub expires_at: OffsetDateTime,
}
impl NewExport {
	pub fn new(
		patient_id: i64,
		kind: ExportKind,
		now: OffsetDateTime,
		retention: Duration,
	) -> Result<Self, RetentionOverflow> {
		let expires_at = now
			.checked_add(retention)
			.ok_or(RetentionOverflow { days: retention.whole_days() })?;

		Ok(Self { patient_id, kind, status: ExportStatus::Pending, created_at: now, expires_at })
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
	pub export_id: i64,
	pub patient_id: i64,
	pub kind: ExportKind,
	pub status: ExportStatus,
	pub file_path: Option<String>,
	pub created_at: OffsetDateTime,
	pub completed_at: Option<OffsetDateTime>,
	pub expires_at: OffsetDateTime,
	pub error_message: Option<String>,
}
impl ExportRecord {
	pub fn from_new(export_id: i64, new: NewExport) -> Self {
		Self {
			export_id,
			patient_id: new.patient_id,
			kind: new.kind,
			status: new.status,
			file_path: None,
			created_at: new.created_at,
			completed_at: None,
			expires_at: new.expires_at,
			error_message: None,
		}
	}

	pub fn claim(&mut self) -> Result<(), TransitionError> {
		self.transition(ExportStatus::Pending, ExportStatus::Processing)
	}

	pub fn complete(
		&mut self,
		location: impl Into<String>,
		now: OffsetDateTime,
	) -> Result<(), TransitionError> {
		self.transition(ExportStatus::Processing, ExportStatus::Completed)?;

		self.file_path = Some(location.into());
		self.completed_at = Some(now);

		Ok(())
	}

	pub fn fail(&mut self, message: &str, now: OffsetDateTime) -> Result<(), TransitionError> {
		self.transition(ExportStatus::Processing, ExportStatus::Failed)?;

		self.error_message = Some(truncate_error(message));
		self.completed_at = Some(now);

		Ok(())
	}

	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		now > self.expires_at
	}

	/// Resolves the artifact location, or why it cannot be served. Expiry wins over status.
	pub fn check_downloadable(&self, now: OffsetDateTime) -> Result<&str, DownloadError> {
		if self.is_expired(now) {
			return Err(DownloadError::Expired);
		}

		match (self.status, self.file_path.as_deref()) {
			(ExportStatus::Completed, Some(path)) => Ok(path),
			(status, _) => Err(DownloadError::NotReady(status)),
		}
	}

	fn transition(&mut self, from: ExportStatus, to: ExportStatus) -> Result<(), TransitionError> {
		if self.status != from {
			return Err(TransitionError::InvalidTransition { from: self.status, to });
		}

		self.status = to;

		Ok(())
	}
}

/// Clips an error text to the persisted column width on a character boundary.
pub fn truncate_error(message: &str) -> String {
	let trimmed = message.trim();

	if trimmed.chars().count() <= MAX_ERROR_CHARS {
		return trimmed.to_string();
	}

	let mut out: String = trimmed.chars().take(MAX_ERROR_CHARS - 3).collect();

	out.push_str("...");

	out
}
