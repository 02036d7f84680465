use std::{io::ErrorKind, path::Path};

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use medex_domain::export::{ExportKind, ExportRecord, ExportStatus, NewExport};
use medex_storage::{exports, patients};

use crate::{Error, MedexService, Result};

pub const REQUEST_ACCEPTED_MESSAGE: &str = "Export request received";

#[derive(Debug, Clone, Serialize)]
pub struct ExportRequestResponse {
	pub export_id: i64,
	pub status: ExportStatus,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportView {
	pub export_id: i64,
	pub patient_id: i64,
	pub export_kind: ExportKind,
	pub status: ExportStatus,
	pub file_path: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde::option")]
	pub completed_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde")]
	pub expires_at: OffsetDateTime,
	pub is_expired: bool,
	pub error_message: Option<String>,
}
impl ExportView {
	pub fn from_record(record: &ExportRecord, now: OffsetDateTime) -> Self {
		Self {
			export_id: record.export_id,
			patient_id: record.patient_id,
			export_kind: record.kind,
			status: record.status,
			file_path: record.file_path.clone(),
			created_at: record.created_at,
			completed_at: record.completed_at,
			expires_at: record.expires_at,
			is_expired: record.is_expired(now),
			error_message: record.error_message.clone(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportList {
	pub exports: Vec<ExportView>,
	pub total: usize,
}

#[derive(Debug, Clone)]
pub struct DownloadFile {
	pub export_id: i64,
	pub file_name: String,
	pub content_type: &'static str,
	pub bytes: Vec<u8>,
}

impl MedexService {
	/// Records a pending export for the caller. Generation happens elsewhere; the caller is
	/// expected to hand the returned id to the export queue.
	pub async fn request_export(
		&self,
		caller_patient_id: i64,
		patient_id: i64,
	) -> Result<ExportRequestResponse> {
		ensure_owner(caller_patient_id, patient_id)?;

		if patients::fetch_patient(&self.db, patient_id).await?.is_none() {
			return Err(Error::NotFound { message: "Patient not found.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let new = NewExport::new(patient_id, ExportKind::Csv, now, self.retention())?;
		let record = exports::insert_export(&self.db, &new).await?;

		tracing::info!(export_id = record.export_id, patient_id, "Export requested.");

		Ok(ExportRequestResponse {
			export_id: record.export_id,
			status: record.status,
			created_at: record.created_at,
			message: REQUEST_ACCEPTED_MESSAGE.to_string(),
		})
	}

	pub async fn export_status(&self, caller_patient_id: i64, export_id: i64) -> Result<ExportView> {
		let record = self.fetch_export(export_id).await?;

		ensure_owner(caller_patient_id, record.patient_id)?;

		Ok(ExportView::from_record(&record, OffsetDateTime::now_utc()))
	}

	pub async fn list_exports(&self, caller_patient_id: i64, patient_id: i64) -> Result<ExportList> {
		ensure_owner(caller_patient_id, patient_id)?;

		let now = OffsetDateTime::now_utc();
		let records = exports::list_patient_exports(&self.db, patient_id).await?;
		let exports: Vec<ExportView> =
			records.iter().map(|record| ExportView::from_record(record, now)).collect();

		Ok(ExportList { total: exports.len(), exports })
	}

	/// Serves the artifact of a completed export. Expiry is checked before status, and a
	/// record whose file vanished from disk answers `NotFound`.
	pub async fn download_export(&self, export_id: i64) -> Result<DownloadFile> {
		let record = self.fetch_export(export_id).await?;
		let location = record.check_downloadable(OffsetDateTime::now_utc())?;
		let bytes = match tokio::fs::read(location).await {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == ErrorKind::NotFound => {
				tracing::warn!(export_id, path = %location, "Export file missing on disk.");

				return Err(Error::NotFound { message: "Export file not found.".to_string() });
			},
			Err(err) => return Err(err.into()),
		};
		let file_name = Path::new(location)
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| format!("export_{export_id}.{}", record.kind.extension()));

		Ok(DownloadFile { export_id, file_name, content_type: record.kind.content_type(), bytes })
	}

	pub(crate) fn retention(&self) -> Duration {
		Duration::days(self.cfg.exports.retention_days)
	}

	async fn fetch_export(&self, export_id: i64) -> Result<ExportRecord> {
		exports::fetch_export(&self.db, export_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: "Export not found.".to_string() })
	}
}

fn ensure_owner(caller_patient_id: i64, patient_id: i64) -> Result<()> {
	if caller_patient_id != patient_id {
		return Err(Error::Forbidden {
			message: "Exports belong to another patient.".to_string(),
		});
	}

	Ok(())
}
