//! Claim, generate, record the outcome, notify.

use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use medex_domain::{export::ExportRecord, history, mail::Attachment};
use medex_storage::{exports, history as history_store, patients};

use crate::{Error, MedexService, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
	Completed { file_path: String, notified: bool },
	Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
	pub processed: usize,
	pub completed: usize,
	pub failed: usize,
	/// Records that could not be processed at all, lost claims included.
	pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedExport {
	pub path: PathBuf,
	pub rows: usize,
}

impl MedexService {
	/// Writes the patient's treatment history to a new file under the export directory.
	pub async fn generate_export(
		&self,
		record: &ExportRecord,
		now: OffsetDateTime,
	) -> Result<GeneratedExport> {
		let patient = patients::fetch_patient(&self.db, record.patient_id)
			.await?
			.ok_or_else(|| Error::NotFound {
				message: format!("Patient {} not found.", record.patient_id),
			})?;
		let rows = history_store::load_treatment_history(&self.db, record.patient_id).await?;
		let mut buffer = Vec::new();
		let written = history::write_csv(&mut buffer, &patient.to_export_patient(), &rows)
			.map_err(|err| Error::Io { message: err.to_string() })?;
		let dir = Path::new(&self.cfg.exports.dir);

		tokio::fs::create_dir_all(dir).await?;

		let file_name = history::export_file_name(
			record.patient_id,
			record.export_id,
			record.kind.extension(),
			now,
		);
		let path = dir.join(file_name);

		write_atomically(&path, &buffer).await?;

		Ok(GeneratedExport { path, rows: written })
	}

	/// Runs one export to a terminal state. A record that is not pending yields
	/// `InvalidTransition`, a lost claim returns `Conflict`; neither touches the record.
	/// Generation errors and a failed completion update both end in `failed`.
	pub async fn process_one(&self, export_id: i64) -> Result<ProcessOutcome> {
		let mut pending = exports::fetch_export(&self.db, export_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("Export {export_id} does not exist.") }
		})?;

		pending.claim()?;

		let record = exports::claim_export(&self.db, export_id).await?;

		tracing::info!(export_id, patient_id = record.patient_id, "Export claimed.");

		let generated = match self.generate_export(&record, OffsetDateTime::now_utc()).await {
			Ok(generated) => generated,
			Err(err) => return self.fail_claimed(&record, &err.to_string()).await,
		};
		let file_path = generated.path.to_string_lossy().into_owned();
		let completed = match self.record_completion(&record, &file_path).await {
			Ok(completed) => completed,
			Err(err) => {
				if let Err(remove_err) = tokio::fs::remove_file(&generated.path).await {
					tracing::warn!(
						export_id,
						path = %file_path,
						error = %remove_err,
						"Orphaned export file could not be removed."
					);
				}

				return self
					.fail_claimed(&record, &format!("Failed to record completion: {err}"))
					.await;
			},
		};

		tracing::info!(export_id, rows = generated.rows, path = %file_path, "Export completed.");

		let notified = self.notify_export_ready(&completed).await;

		Ok(ProcessOutcome::Completed { file_path, notified })
	}

	async fn record_completion(
		&self,
		claimed: &ExportRecord,
		file_path: &str,
	) -> Result<ExportRecord> {
		let now = OffsetDateTime::now_utc();
		let mut next = claimed.clone();

		next.complete(file_path, now)?;

		Ok(exports::mark_export_completed(&self.db, next.export_id, file_path, now).await?)
	}

	async fn fail_claimed(&self, claimed: &ExportRecord, error: &str) -> Result<ProcessOutcome> {
		let now = OffsetDateTime::now_utc();
		let mut next = claimed.clone();

		next.fail(error, now)?;

		let error = next.error_message.unwrap_or_default();

		exports::mark_export_failed(&self.db, next.export_id, &error, now).await?;

		tracing::warn!(export_id = next.export_id, error = %error, "Export failed.");

		Ok(ProcessOutcome::Failed { error })
	}

	/// Safety net for records that never reached a queue worker.
	pub async fn process_all_pending(&self) -> Result<BatchReport> {
		let ids = exports::list_pending_export_ids(&self.db).await?;
		let mut report = BatchReport { processed: ids.len(), ..Default::default() };

		for export_id in ids {
			match self.process_one(export_id).await {
				Ok(ProcessOutcome::Completed { .. }) => report.completed += 1,
				Ok(ProcessOutcome::Failed { .. }) => report.failed += 1,
				Err(err @ (Error::Conflict { .. } | Error::InvalidTransition(_))) => {
					tracing::debug!(export_id, error = %err, "Pending export claimed elsewhere.");

					report.skipped += 1;
				},
				Err(err) => {
					tracing::error!(export_id, error = %err, "Pending export could not be processed.");

					report.skipped += 1;
				},
			}
		}

		Ok(report)
	}

	/// Emails the download link. Failures are logged and reported as `false`.
	pub async fn notify_export_ready(&self, record: &ExportRecord) -> bool {
		match self.try_notify_export_ready(record).await {
			Ok(sent) => sent,
			Err(err) => {
				tracing::warn!(export_id = record.export_id, error = %err, "Export notification failed.");

				false
			},
		}
	}

	async fn try_notify_export_ready(&self, record: &ExportRecord) -> Result<bool> {
		let Some(patient) = patients::fetch_patient(&self.db, record.patient_id).await? else {
			return Ok(false);
		};
		let Some(email) = patient.email.as_deref().map(str::trim).filter(|email| !email.is_empty())
		else {
			tracing::info!(export_id = record.export_id, "Patient has no email; skipping notification.");

			return Ok(false);
		};
		let link = download_link(&self.cfg.service.public_base_url, record.export_id);
		let mut message = self.templates.export_ready(
			email,
			&patient.full_name(),
			&link,
			record.kind,
			self.cfg.exports.retention_days,
		)?;

		if self.cfg.exports.attach_file
			&& let Some(location) = record.file_path.as_deref()
		{
			let content = tokio::fs::read(location).await?;
			let filename = Path::new(location)
				.file_name()
				.map(|name| name.to_string_lossy().into_owned())
				.unwrap_or_else(|| format!("export_{}.{}", record.export_id, record.kind.extension()));

			message.attachments.push(Attachment {
				filename,
				content_type: record.kind.content_type().to_string(),
				content,
			});
		}

		self.send_mail(&message).await?;

		Ok(true)
	}
}

pub fn download_link(public_base_url: &str, export_id: i64) -> String {
	format!("{}/download/export/{export_id}", public_base_url.trim_end_matches('/'))
}

/// Writes to a `.partial` sibling and renames it into place; the sibling is removed when any
/// step fails.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
	let mut partial = path.as_os_str().to_owned();

	partial.push(".partial");

	let partial = PathBuf::from(partial);
	let result = async {
		tokio::fs::write(&partial, contents).await?;
		tokio::fs::rename(&partial, path).await
	}
	.await;

	if let Err(err) = result {
		let _ = tokio::fs::remove_file(&partial).await;

		return Err(err.into());
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn link_joins_base_without_double_slash() {
		assert_eq!(
			download_link("https://records.example/", 12),
			"https://records.example/download/export/12"
		);
		assert_eq!(download_link("http://localhost:5000", 3), "http://localhost:5000/download/export/3");
	}

	#[tokio::test]
	async fn atomic_write_leaves_only_final_file() {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");
		let path = dir.path().join("patient_1_export_2.csv");

		write_atomically(&path, b"a,b\n").await.expect("Expected write to succeed.");

		let names: Vec<String> = std::fs::read_dir(dir.path())
			.expect("Failed to list dir.")
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.file_name().to_string_lossy().into_owned())
			.collect();

		assert_eq!(names, vec!["patient_1_export_2.csv".to_string()]);
		assert_eq!(std::fs::read(&path).expect("Failed to read file."), b"a,b\n");
	}

	#[tokio::test]
	async fn failed_write_leaves_nothing_behind() {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");
		let path = dir.path().join("missing").join("out.csv");

		assert!(matches!(write_atomically(&path, b"x").await, Err(Error::Io { .. })));
		assert!(!dir.path().join("missing").exists());
	}
}
