//! Outgoing notification messages, rendered from the handlebars templates under `templates/`.

use handlebars::{
	Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
	RenderErrorReason,
};
use serde::Serialize;
use time::{OffsetDateTime, macros::format_description};

use crate::{export::ExportKind, history, report::DoctorReport};

const APPOINTMENT_REMINDER: &str = "appointment_reminder";
const EXPORT_READY: &str = "export_ready";
const MONTHLY_REPORT: &str = "monthly_report";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
	#[error("Mail template failed to compile: {0}")]
	Template(#[from] handlebars::TemplateError),
	#[error("Mail template failed to render: {0}")]
	Render(#[from] RenderError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
	pub filename: String,
	pub content_type: String,
	pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
	pub to: String,
	pub subject: String,
	pub html: String,
	pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentReminder<'a> {
	pub patient_email: &'a str,
	pub patient_name: &'a str,
	pub doctor_name: &'a str,
	/// Already formatted, e.g. "Monday, March 02, 2026".
	pub appointment_date: &'a str,
	pub appointment_time: &'a str,
}

#[derive(Serialize)]
struct ExportReadyView<'a> {
	patient_name: &'a str,
	download_link: &'a str,
	kind_label: &'static str,
	kind_lower: String,
	retention_days: i64,
}

#[derive(Serialize)]
struct ReportView<'a> {
	doctor_name: &'a str,
	specialization: &'a str,
	month: String,
	total_appointments: usize,
	total_examinations: i64,
	examined_percent: String,
	rows: Vec<ReportRowView<'a>>,
	generated_on: String,
}

#[derive(Serialize)]
struct ReportRowView<'a> {
	date: String,
	patient: &'a str,
	diagnosis: Option<&'a str>,
}

/// Compiled mail templates. Build once and share.
pub struct MailTemplates {
	registry: Handlebars<'static>,
}
impl MailTemplates {
	pub fn new() -> Result<Self, MailError> {
		let mut registry = Handlebars::new();

		registry.register_helper("truncate", Box::new(truncate));
		registry.register_partial("signature", include_str!("../templates/signature.html.hbs"))?;
		registry.register_template_string(
			APPOINTMENT_REMINDER,
			include_str!("../templates/appointment_reminder.html.hbs"),
		)?;
		registry.register_template_string(
			EXPORT_READY,
			include_str!("../templates/export_ready.html.hbs"),
		)?;
		registry.register_template_string(
			MONTHLY_REPORT,
			include_str!("../templates/monthly_report.html.hbs"),
		)?;

		Ok(Self { registry })
	}

	pub fn appointment_reminder(
		&self,
		reminder: &AppointmentReminder<'_>,
	) -> Result<OutgoingMail, MailError> {
		let html = self.registry.render(APPOINTMENT_REMINDER, reminder)?;

		Ok(OutgoingMail {
			to: reminder.patient_email.to_string(),
			subject: format!("Appointment Reminder - {}", reminder.appointment_date),
			html,
			attachments: Vec::new(),
		})
	}

	pub fn export_ready(
		&self,
		patient_email: &str,
		patient_name: &str,
		download_link: &str,
		kind: ExportKind,
		retention_days: i64,
	) -> Result<OutgoingMail, MailError> {
		let label = kind.label();
		let html = self.registry.render(
			EXPORT_READY,
			&ExportReadyView {
				patient_name,
				download_link,
				kind_label: label,
				kind_lower: label.to_lowercase(),
				retention_days,
			},
		)?;

		Ok(OutgoingMail {
			to: patient_email.to_string(),
			subject: format!("Your {label} Export is Ready"),
			html,
			attachments: Vec::new(),
		})
	}

	pub fn monthly_report(
		&self,
		doctor_email: &str,
		report: &DoctorReport,
		generated_at: OffsetDateTime,
	) -> Result<OutgoingMail, MailError> {
		let stamp_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
		let rows = report
			.appointments
			.iter()
			.map(|appointment| ReportRowView {
				date: history::format_date(appointment.date),
				patient: appointment.patient_name.as_deref().unwrap_or(history::PLACEHOLDER),
				diagnosis: appointment
					.diagnosis
					.as_deref()
					.map(str::trim)
					.filter(|diagnosis| !diagnosis.is_empty()),
			})
			.collect();
		let view = ReportView {
			doctor_name: &report.doctor_name,
			specialization: &report.specialization,
			month: report.period.label(),
			total_appointments: report.total_appointments(),
			total_examinations: report.total_examinations(),
			examined_percent: format!("{:.0}", report.examined_share() * 100.0),
			rows,
			generated_on: generated_at
				.format(&stamp_format)
				.unwrap_or_else(|_| generated_at.to_string()),
		};
		let html = self.registry.render(MONTHLY_REPORT, &view)?;

		Ok(OutgoingMail {
			to: doctor_email.to_string(),
			subject: format!("Monthly Activity Report - {}", report.period.label()),
			html,
			attachments: Vec::new(),
		})
	}
}

/// `{{truncate text limit}}`: clips to `limit` characters and appends "..." when clipped.
fn truncate(
	h: &Helper,
	_: &Handlebars,
	_: &Context,
	_: &mut RenderContext,
	out: &mut dyn Output,
) -> HelperResult {
	let text = h.param(0).and_then(|param| param.value().as_str()).ok_or_else(|| {
		RenderError::from(RenderErrorReason::Other("truncate expects a text.".to_string()))
	})?;
	let limit = h.param(1).and_then(|param| param.value().as_u64()).ok_or_else(|| {
		RenderError::from(RenderErrorReason::Other("truncate expects a limit.".to_string()))
	})?;

	out.write(&handlebars::html_escape(&clip(text, limit as usize)))?;

	Ok(())
}

fn clip(text: &str, limit: usize) -> String {
	if text.chars().count() <= limit {
		return text.to_string();
	}

	let mut out: String = text.chars().take(limit).collect();

	out.push_str("...");

	out
}
