use std::{
	path::Path,
	sync::{Arc, Mutex},
};

use serde_json::Map;
use sqlx::postgres::PgPoolOptions;
use time::{Duration, OffsetDateTime, macros::date};

use medex_config::{Config, Exports, Jobs, Mail, Postgres, Security, Service, Storage};
use medex_domain::{
	export::ExportStatus,
	history::EXPORT_COLUMNS,
	mail::OutgoingMail,
};
use medex_service::{BoxFuture, Error, Mailer, MedexService, ProcessOutcome, Result};
use medex_storage::{db::Db, exports};
use medex_testkit::TestDatabase;

#[derive(Default)]
struct RecordingMailer {
	sent: Mutex<Vec<OutgoingMail>>,
	fail: bool,
}
impl RecordingMailer {
	fn failing() -> Self {
		Self { sent: Mutex::new(Vec::new()), fail: true }
	}

	fn sent(&self) -> Vec<OutgoingMail> {
		self.sent.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl Mailer for RecordingMailer {
	fn send<'a>(&'a self, _cfg: &'a Mail, mail: &'a OutgoingMail) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if self.fail {
				return Err(Error::Provider { message: "relay unavailable".to_string() });
			}

			self.sent.lock().unwrap_or_else(|err| err.into_inner()).push(mail.clone());

			Ok(())
		})
	}
}

fn test_config(dsn: &str, export_dir: &Path) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			public_base_url: "https://records.example".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage { postgres: Postgres { dsn: dsn.to_string(), pool_max_conns: 2 } },
		exports: Exports {
			dir: export_dir.to_string_lossy().into_owned(),
			retention_days: 7,
			workers: 1,
			queue_capacity: 8,
			attach_file: false,
		},
		mail: Mail {
			provider_id: "test".to_string(),
			api_base: "http://127.0.0.1:1".to_string(),
			api_key: "test-key".to_string(),
			path: "/send".to_string(),
			sender: "records@hospital.example".to_string(),
			timeout_ms: 1_000,
			default_headers: Map::new(),
		},
		jobs: Jobs {
			daily_reminder: String::new(),
			monthly_report: String::new(),
			export_cleanup: String::new(),
			pending_sweep: String::new(),
			reminder_time_label: "09:00 AM".to_string(),
		},
		security: Security { bind_localhost_only: true, api_auth_token: None },
	}
}

struct Harness {
	test_db: TestDatabase,
	service: MedexService,
	mailer: Arc<RecordingMailer>,
	_dir: tempfile::TempDir,
}

async fn harness_with(mailer: RecordingMailer) -> Option<Harness> {
	let base_dsn = medex_testkit::env_dsn()?;
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let dir = tempfile::tempdir().expect("Failed to create export dir.");
	let cfg = test_config(test_db.dsn(), &dir.path().join("exports"));
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let mailer = Arc::new(mailer);
	let service =
		MedexService::with_mailer(cfg, db, mailer.clone()).expect("Failed to build service.");

	Some(Harness { test_db, service, mailer, _dir: dir })
}

async fn insert_patient(service: &MedexService, email: Option<&str>) -> i64 {
	sqlx::query_scalar(
		"INSERT INTO patients (first_name, last_name, email) VALUES ('Ada', 'Byron', $1) RETURNING patient_id",
	)
	.bind(email)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to insert patient.")
}

async fn insert_doctor(service: &MedexService, email: Option<&str>) -> i64 {
	sqlx::query_scalar(
		"\
INSERT INTO doctors (first_name, last_name, specialization, email)
VALUES ('Gregory', 'House', 'Cardiology', $1)
RETURNING doctor_id",
	)
	.bind(email)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to insert doctor.")
}

async fn insert_visit(
	service: &MedexService,
	patient_id: i64,
	doctor_id: i64,
	day: time::Date,
	diagnosis: Option<&str>,
) -> i64 {
	let appointment_id: i64 = sqlx::query_scalar(
		"\
INSERT INTO appointments (patient_id, doctor_id, appointment_date)
VALUES ($1, $2, $3)
RETURNING appointment_id",
	)
	.bind(patient_id)
	.bind(doctor_id)
	.bind(day)
	.fetch_one(&service.db.pool)
	.await
	.expect("Failed to insert appointment.");

	if let Some(diagnosis) = diagnosis {
		sqlx::query(
			"\
INSERT INTO examinations (appointment_id, patient_id, diagnosis, prescription)
VALUES ($1, $2, $3, 'Rest')",
		)
		.bind(appointment_id)
		.bind(patient_id)
		.bind(diagnosis)
		.execute(&service.db.pool)
		.await
		.expect("Failed to insert examination.");
	}

	appointment_id
}

#[tokio::test]
async fn other_patients_are_forbidden_before_any_query() {
	let dir = tempfile::tempdir().expect("Failed to create export dir.");
	let cfg = test_config("postgres://postgres@127.0.0.1:1/medex", dir.path());
	let pool = PgPoolOptions::new()
		.max_connections(1)
		.connect_lazy(&cfg.storage.postgres.dsn)
		.expect("Failed to create lazy pool.");
	let service = MedexService::with_mailer(cfg, Db { pool }, Arc::new(RecordingMailer::default()))
		.expect("Failed to build service.");

	assert!(matches!(service.request_export(1, 2).await, Err(Error::Forbidden { .. })));
	assert!(matches!(service.list_exports(1, 2).await, Err(Error::Forbidden { .. })));
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn completed_export_has_header_and_rows_in_query_order() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!("Skipping completed_export_has_header_and_rows_in_query_order; set MEDEX_PG_DSN to run.");

		return;
	};
	let patient_id = insert_patient(&h.service, Some("ada@example.org")).await;
	let doctor_id = insert_doctor(&h.service, None).await;

	for (day, diagnosis) in [
		(date!(2026 - 01 - 05), "Arrhythmia"),
		(date!(2025 - 12 - 01), "Murmur"),
		(date!(2026 - 02 - 10), "Angina"),
	] {
		insert_visit(&h.service, patient_id, doctor_id, day, Some(diagnosis)).await;
	}

	let requested = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	assert_eq!(requested.status, ExportStatus::Pending);

	let outcome = h.service.process_one(requested.export_id).await.expect("Processing failed.");
	let ProcessOutcome::Completed { file_path, notified } = outcome else {
		panic!("Expected completion, got {outcome:?}.");
	};
	let text = std::fs::read_to_string(&file_path).expect("Artifact must exist.");
	let lines: Vec<&str> = text.lines().collect();

	assert!(notified);
	assert_eq!(lines.len(), 4);
	assert_eq!(lines[0], EXPORT_COLUMNS.join(","));
	assert!(lines[1].contains("Arrhythmia"));
	assert!(lines[2].contains("Murmur"));
	assert!(lines[3].contains("Angina"));

	let view = h.service.export_status(patient_id, requested.export_id).await.expect("Status failed.");

	assert_eq!(view.status, ExportStatus::Completed);
	assert_eq!(view.file_path.as_deref(), Some(file_path.as_str()));
	assert_eq!(view.expires_at, view.created_at + Duration::days(7));

	let sent = h.mailer.sent();

	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].to, "ada@example.org");
	assert!(sent[0].html.contains(&format!("/download/export/{}", requested.export_id)));

	let download = h.service.download_export(requested.export_id).await.expect("Download failed.");

	assert_eq!(download.content_type, "text/csv");
	assert_eq!(download.bytes, text.into_bytes());

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn generation_failure_marks_failed_without_file() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!("Skipping generation_failure_marks_failed_without_file; set MEDEX_PG_DSN to run.");

		return;
	};
	let patient_id = insert_patient(&h.service, None).await;
	let requested = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	// Occupy the export directory path with a file so it cannot be created.
	std::fs::write(&h.service.cfg.exports.dir, b"not a directory").expect("Failed to block dir.");

	let outcome = h.service.process_one(requested.export_id).await.expect("Processing failed.");

	assert!(matches!(outcome, ProcessOutcome::Failed { .. }));

	let record = exports::fetch_export(&h.service.db, requested.export_id)
		.await
		.expect("Fetch failed.")
		.expect("Record must exist.");

	assert_eq!(record.status, ExportStatus::Failed);
	assert!(record.error_message.is_some());
	assert_eq!(record.file_path, None);
	assert!(h.mailer.sent().is_empty());
	assert!(matches!(
		h.service.download_export(requested.export_id).await,
		Err(Error::NotReady { status: ExportStatus::Failed })
	));

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn failed_completion_update_ends_failed_and_removes_the_file() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!(
			"Skipping failed_completion_update_ends_failed_and_removes_the_file; set MEDEX_PG_DSN to run."
		);

		return;
	};
	let patient_id = insert_patient(&h.service, Some("ada@example.org")).await;
	let requested = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	sqlx::raw_sql(
		"\
CREATE FUNCTION reject_export_completion() RETURNS trigger LANGUAGE plpgsql AS $$
BEGIN
	IF NEW.status = 'completed' THEN
		RAISE EXCEPTION 'transient db failure';
	END IF;
	RETURN NEW;
END
$$;
CREATE TRIGGER reject_export_completion
BEFORE UPDATE ON treatment_exports
FOR EACH ROW EXECUTE FUNCTION reject_export_completion();",
	)
	.execute(&h.service.db.pool)
	.await
	.expect("Failed to install trigger.");

	let outcome = h.service.process_one(requested.export_id).await.expect("Processing failed.");
	let ProcessOutcome::Failed { error } = outcome else {
		panic!("Expected failure, got {outcome:?}.");
	};

	assert!(error.contains("transient db failure"), "{error}");

	let record = exports::fetch_export(&h.service.db, requested.export_id)
		.await
		.expect("Fetch failed.")
		.expect("Record must exist.");

	assert_eq!(record.status, ExportStatus::Failed);
	assert_eq!(record.file_path, None);
	assert_eq!(record.error_message.as_deref(), Some(error.as_str()));

	let leftovers = std::fs::read_dir(&h.service.cfg.exports.dir)
		.expect("Export dir must exist.")
		.count();

	assert_eq!(leftovers, 0);
	assert!(h.mailer.sent().is_empty());
	assert_eq!(h.service.process_all_pending().await.expect("Sweep failed.").processed, 0);

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn reprocessing_a_finished_export_is_an_invalid_transition() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!(
			"Skipping reprocessing_a_finished_export_is_an_invalid_transition; set MEDEX_PG_DSN to run."
		);

		return;
	};
	let patient_id = insert_patient(&h.service, None).await;
	let requested = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	h.service.process_one(requested.export_id).await.expect("Processing failed.");

	let before = exports::fetch_export(&h.service.db, requested.export_id)
		.await
		.expect("Fetch failed.")
		.expect("Record must exist.");

	assert!(matches!(
		h.service.process_one(requested.export_id).await,
		Err(Error::InvalidTransition(_))
	));
	assert!(matches!(h.service.process_one(i64::MAX).await, Err(Error::NotFound { .. })));

	let after = exports::fetch_export(&h.service.db, requested.export_id)
		.await
		.expect("Fetch failed.")
		.expect("Record must exist.");

	assert_eq!(before, after);

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn notifier_failure_keeps_export_completed() {
	let Some(h) = harness_with(RecordingMailer::failing()).await else {
		eprintln!("Skipping notifier_failure_keeps_export_completed; set MEDEX_PG_DSN to run.");

		return;
	};
	let patient_id = insert_patient(&h.service, Some("ada@example.org")).await;
	let requested = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");
	let outcome = h.service.process_one(requested.export_id).await.expect("Processing failed.");

	assert!(matches!(outcome, ProcessOutcome::Completed { notified: false, .. }));

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn pending_download_is_not_ready_and_expired_download_is_gone() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!(
			"Skipping pending_download_is_not_ready_and_expired_download_is_gone; set MEDEX_PG_DSN to run."
		);

		return;
	};
	let patient_id = insert_patient(&h.service, None).await;
	let pending = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	assert!(matches!(
		h.service.download_export(pending.export_id).await,
		Err(Error::NotReady { status: ExportStatus::Pending })
	));

	let done = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	h.service.process_one(done.export_id).await.expect("Processing failed.");
	sqlx::query("UPDATE treatment_exports SET expires_at = now() - interval '1 hour' WHERE export_id = $1")
		.bind(done.export_id)
		.execute(&h.service.db.pool)
		.await
		.expect("Failed to backdate expiry.");

	assert!(matches!(h.service.download_export(done.export_id).await, Err(Error::Expired)));
	assert!(matches!(h.service.download_export(i64::MAX).await, Err(Error::NotFound { .. })));

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn sweep_processes_each_pending_record_once() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!("Skipping sweep_processes_each_pending_record_once; set MEDEX_PG_DSN to run.");

		return;
	};
	let patient_id = insert_patient(&h.service, None).await;

	for _ in 0..3 {
		h.service.request_export(patient_id, patient_id).await.expect("Request failed.");
	}

	let report = h.service.process_all_pending().await.expect("Sweep failed.");

	assert_eq!(report.processed, 3);
	assert_eq!(report.completed, 3);
	assert_eq!(report.skipped, 0);
	assert_eq!(h.service.process_all_pending().await.expect("Sweep failed.").processed, 0);

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn cleanup_removes_expired_records_and_files_only() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!("Skipping cleanup_removes_expired_records_and_files_only; set MEDEX_PG_DSN to run.");

		return;
	};
	let patient_id = insert_patient(&h.service, None).await;
	let stale = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");
	let ProcessOutcome::Completed { file_path, .. } =
		h.service.process_one(stale.export_id).await.expect("Processing failed.")
	else {
		panic!("Expected completion.");
	};
	let stale_pending = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");
	let fresh = h.service.request_export(patient_id, patient_id).await.expect("Request failed.");

	sqlx::query("UPDATE treatment_exports SET expires_at = now() - interval '1 day' WHERE export_id = ANY($1)")
		.bind(vec![stale.export_id, stale_pending.export_id])
		.execute(&h.service.db.pool)
		.await
		.expect("Failed to backdate expiry.");

	let report =
		h.service.cleanup_expired_exports(OffsetDateTime::now_utc()).await.expect("Cleanup failed.");

	assert_eq!(report.deleted, 2);
	assert_eq!(report.files_removed, 1);
	assert!(!Path::new(&file_path).exists());
	assert!(
		exports::fetch_export(&h.service.db, fresh.export_id).await.expect("Fetch failed.").is_some()
	);

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set MEDEX_PG_DSN to run."]
async fn reminders_and_reports_reach_the_right_people() {
	let Some(h) = harness_with(RecordingMailer::default()).await else {
		eprintln!("Skipping reminders_and_reports_reach_the_right_people; set MEDEX_PG_DSN to run.");

		return;
	};
	let patient_id = insert_patient(&h.service, Some("ada@example.org")).await;
	let busy = insert_doctor(&h.service, Some("house@hospital.example")).await;

	insert_doctor(&h.service, Some("idle@hospital.example")).await;
	insert_doctor(&h.service, None).await;
	insert_doctor(&h.service, Some("   ")).await;
	insert_visit(&h.service, patient_id, busy, date!(2026 - 03 - 03), None).await;
	insert_visit(&h.service, patient_id, busy, date!(2026 - 02 - 14), Some("Arrhythmia")).await;

	let reminders =
		h.service.send_daily_reminders(date!(2026 - 03 - 02)).await.expect("Reminders failed.");

	assert_eq!((reminders.targets, reminders.sent, reminders.failed), (1, 1, 0));

	let reports = h
		.service
		.send_monthly_reports(date!(2026 - 03 - 01), OffsetDateTime::now_utc())
		.await
		.expect("Reports failed.");

	assert_eq!((reports.targets, reports.sent, reports.failed), (2, 1, 0));

	let sent = h.mailer.sent();

	assert_eq!(sent[0].to, "ada@example.org");
	assert_eq!(sent[0].subject, "Appointment Reminder - Tuesday, March 03, 2026");
	assert_eq!(sent[1].to, "house@hospital.example");
	assert_eq!(sent[1].subject, "Monthly Activity Report - February 2026");
	assert!(sent[1].html.contains("Diagnosis: Arrhythmia"));

	h.test_db.cleanup().await.expect("Failed to cleanup test database.");
}
