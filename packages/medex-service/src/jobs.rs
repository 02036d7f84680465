//! Bodies of the scheduled jobs. Each run scans the database, handles targets one by one and
//! counts per-target failures instead of aborting.

use std::io::ErrorKind;

use time::{Date, OffsetDateTime, macros::format_description};

use medex_domain::{
	mail::{AppointmentReminder, OutgoingMail},
	report::{DoctorReport, ReportPeriod},
};
use medex_storage::{appointments, exports, models::ReminderRow};

use crate::{MedexService, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
	pub targets: usize,
	pub sent: usize,
	pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
	pub deleted: usize,
	pub files_removed: usize,
	pub file_errors: usize,
}

impl MedexService {
	/// Reminds every patient with an appointment on the day after `today`.
	pub async fn send_daily_reminders(&self, today: Date) -> Result<JobReport> {
		let Some(tomorrow) = today.next_day() else {
			return Ok(JobReport::default());
		};
		let targets = appointments::list_reminder_targets(&self.db, tomorrow).await?;
		let mut report = JobReport { targets: targets.len(), ..Default::default() };

		for target in &targets {
			let sent = async {
				let message = self.reminder_mail(target)?;

				self.send_mail(&message).await
			}
			.await;

			match sent {
				Ok(()) => report.sent += 1,
				Err(err) => {
					report.failed += 1;

					tracing::warn!(
						appointment_id = target.appointment_id,
						patient_id = target.patient_id,
						error = %err,
						"Appointment reminder failed."
					);
				},
			}
		}

		tracing::info!(date = %tomorrow, ?report, "Daily reminders sent.");

		Ok(report)
	}

	/// Mails each doctor with an address a summary of the calendar month before `today`.
	/// Doctors without appointments in that month count as targets but receive nothing.
	pub async fn send_monthly_reports(
		&self,
		today: Date,
		generated_at: OffsetDateTime,
	) -> Result<JobReport> {
		let period = ReportPeriod::previous_month(today);
		let doctors = appointments::list_report_doctors(&self.db).await?;
		let mut report = JobReport { targets: doctors.len(), ..Default::default() };

		for doctor in &doctors {
			let rows =
				match appointments::list_doctor_appointments(&self.db, doctor.doctor_id, period).await {
					Ok(rows) => rows,
					Err(err) => {
						report.failed += 1;

						tracing::warn!(doctor_id = doctor.doctor_id, error = %err, "Monthly report query failed.");

						continue;
					},
				};

			if rows.is_empty() {
				continue;
			}

			let doctor_report = DoctorReport {
				doctor_name: doctor.display_name(),
				specialization: doctor.specialization.clone(),
				period,
				appointments: rows,
			};
			let sent = async {
				let message =
					self.templates.monthly_report(&doctor.email, &doctor_report, generated_at)?;

				self.send_mail(&message).await
			}
			.await;

			match sent {
				Ok(()) => report.sent += 1,
				Err(err) => {
					report.failed += 1;

					tracing::warn!(doctor_id = doctor.doctor_id, error = %err, "Monthly report failed.");
				},
			}
		}

		tracing::info!(month = %period.label(), ?report, "Monthly reports sent.");

		Ok(report)
	}

	/// Deletes expired Export Records, then removes their files. A file that is already gone
	/// is not an error.
	pub async fn cleanup_expired_exports(&self, now: OffsetDateTime) -> Result<CleanupReport> {
		let expired = exports::delete_expired_exports(&self.db, now).await?;
		let mut report = CleanupReport { deleted: expired.len(), ..Default::default() };

		for export in &expired {
			let Some(location) = export.file_path.as_deref() else {
				continue;
			};

			match tokio::fs::remove_file(location).await {
				Ok(()) => report.files_removed += 1,
				Err(err) if err.kind() == ErrorKind::NotFound => {},
				Err(err) => {
					report.file_errors += 1;

					tracing::warn!(export_id = export.export_id, path = %location, error = %err, "Failed to remove expired export file.");
				},
			}
		}

		tracing::info!(?report, "Expired exports cleaned up.");

		Ok(report)
	}

	fn reminder_mail(&self, target: &ReminderRow) -> Result<OutgoingMail> {
		let patient_name = format!("{} {}", target.patient_first_name, target.patient_last_name);
		let doctor_name = format!("Dr. {} {}", target.doctor_first_name, target.doctor_last_name);
		let date_label = reminder_date_label(target.appointment_date);

		let message = self.templates.appointment_reminder(&AppointmentReminder {
			patient_email: &target.patient_email,
			patient_name: &patient_name,
			doctor_name: &doctor_name,
			appointment_date: &date_label,
			appointment_time: &self.cfg.jobs.reminder_time_label,
		})?;

		Ok(message)
	}
}

pub fn reminder_date_label(date: Date) -> String {
	let format = format_description!("[weekday], [month repr:long] [day], [year]");

	date.format(&format).unwrap_or_else(|_| date.to_string())
}
