//! Export Record persistence. State changes are conditional updates so that concurrent
//! workers cannot both move the same record.

use time::OffsetDateTime;

use medex_domain::export::{ExportRecord, ExportStatus, NewExport, truncate_error};

use crate::{
	Error, Result,
	db::Db,
	models::{ExpiredExport, ExportRow},
};

const EXPORT_COLUMNS: &str = "\
export_id, patient_id, export_kind, status, file_path, created_at, completed_at, expires_at, \
error_message";

pub async fn insert_export(db: &Db, new: &NewExport) -> Result<ExportRecord> {
	let sql = format!(
		"\
INSERT INTO treatment_exports (patient_id, export_kind, status, created_at, expires_at)
VALUES ($1, $2, $3, $4, $5)
RETURNING {EXPORT_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ExportRow>(&sql)
		.bind(new.patient_id)
		.bind(new.kind.as_str())
		.bind(new.status.as_str())
		.bind(new.created_at)
		.bind(new.expires_at)
		.fetch_one(&db.pool)
		.await?;

	Ok(row.try_into()?)
}

pub async fn fetch_export(db: &Db, export_id: i64) -> Result<Option<ExportRecord>> {
	let sql = format!("SELECT {EXPORT_COLUMNS} FROM treatment_exports WHERE export_id = $1");
	let row = sqlx::query_as::<_, ExportRow>(&sql).bind(export_id).fetch_optional(&db.pool).await?;

	row.map(|row| ExportRecord::try_from(row).map_err(Error::from)).transpose()
}

/// Newest first.
pub async fn list_patient_exports(db: &Db, patient_id: i64) -> Result<Vec<ExportRecord>> {
	let sql = format!(
		"\
SELECT {EXPORT_COLUMNS}
FROM treatment_exports
WHERE patient_id = $1
ORDER BY created_at DESC, export_id DESC"
	);
	let rows = sqlx::query_as::<_, ExportRow>(&sql).bind(patient_id).fetch_all(&db.pool).await?;

	rows.into_iter().map(|row| ExportRecord::try_from(row).map_err(Error::from)).collect()
}

pub async fn list_pending_export_ids(db: &Db) -> Result<Vec<i64>> {
	let ids = sqlx::query_scalar::<_, i64>(
		"\
SELECT export_id
FROM treatment_exports
WHERE status = 'pending'
ORDER BY export_id ASC",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(ids)
}

/// Moves a pending record to processing. Fails with `Conflict` when the record exists in
/// any other state, which means another worker claimed it first.
pub async fn claim_export(db: &Db, export_id: i64) -> Result<ExportRecord> {
	let sql = format!(
		"\
UPDATE treatment_exports
SET status = 'processing'
WHERE export_id = $1 AND status = 'pending'
RETURNING {EXPORT_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ExportRow>(&sql).bind(export_id).fetch_optional(&db.pool).await?;

	match row {
		Some(row) => Ok(row.try_into()?),
		None => Err(missing_or_conflict(db, export_id, ExportStatus::Pending).await),
	}
}

pub async fn mark_export_completed(
	db: &Db,
	export_id: i64,
	file_path: &str,
	now: OffsetDateTime,
) -> Result<ExportRecord> {
	if file_path.trim().is_empty() {
		return Err(Error::InvalidArgument("file_path must be non-empty.".to_string()));
	}

	let sql = format!(
		"\
UPDATE treatment_exports
SET status = 'completed', file_path = $2, completed_at = $3
WHERE export_id = $1 AND status = 'processing'
RETURNING {EXPORT_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ExportRow>(&sql)
		.bind(export_id)
		.bind(file_path)
		.bind(now)
		.fetch_optional(&db.pool)
		.await?;

	match row {
		Some(row) => Ok(row.try_into()?),
		None => Err(missing_or_conflict(db, export_id, ExportStatus::Processing).await),
	}
}

pub async fn mark_export_failed(
	db: &Db,
	export_id: i64,
	message: &str,
	now: OffsetDateTime,
) -> Result<ExportRecord> {
	let message = truncate_error(message);
	let sql = format!(
		"\
UPDATE treatment_exports
SET status = 'failed', error_message = $2, completed_at = $3
WHERE export_id = $1 AND status = 'processing'
RETURNING {EXPORT_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ExportRow>(&sql)
		.bind(export_id)
		.bind(message.as_str())
		.bind(now)
		.fetch_optional(&db.pool)
		.await?;

	match row {
		Some(row) => Ok(row.try_into()?),
		None => Err(missing_or_conflict(db, export_id, ExportStatus::Processing).await),
	}
}

/// Deletes every record whose `expires_at` lies before `now`, whatever its status.
pub async fn delete_expired_exports(db: &Db, now: OffsetDateTime) -> Result<Vec<ExpiredExport>> {
	let rows = sqlx::query_as::<_, ExpiredExport>(
		"\
DELETE FROM treatment_exports
WHERE expires_at < $1
RETURNING export_id, patient_id, file_path",
	)
	.bind(now)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

async fn missing_or_conflict(db: &Db, export_id: i64, expected: ExportStatus) -> Error {
	match fetch_export(db, export_id).await {
		Ok(Some(record)) => Error::Conflict(format!(
			"Export {export_id} is {}, expected {expected}.",
			record.status
		)),
		Ok(None) => Error::NotFound(format!("Export {export_id} does not exist.")),
		Err(err) => err,
	}
}
