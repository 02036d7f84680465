use time::{Date, OffsetDateTime};

use medex_domain::{
	export::{ExportRecord, ParseError},
	history::{ExportPatient, TreatmentHistoryRow},
	report::ReportAppointment,
};

#[derive(Debug, sqlx::FromRow)]
pub struct ExportRow {
	pub export_id: i64,
	pub patient_id: i64,
	pub export_kind: String,
	pub status: String,
	pub file_path: Option<String>,
	pub created_at: OffsetDateTime,
	pub completed_at: Option<OffsetDateTime>,
	pub expires_at: OffsetDateTime,
	pub error_message: Option<String>,
}
impl TryFrom<ExportRow> for ExportRecord {
	type Error = ParseError;

	fn try_from(row: ExportRow) -> Result<Self, Self::Error> {
		Ok(Self {
			export_id: row.export_id,
			patient_id: row.patient_id,
			kind: row.export_kind.parse()?,
			status: row.status.parse()?,
			file_path: row.file_path,
			created_at: row.created_at,
			completed_at: row.completed_at,
			expires_at: row.expires_at,
			error_message: row.error_message,
		})
	}
}

/// Export removed by the cleanup sweep.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExpiredExport {
	pub export_id: i64,
	pub patient_id: i64,
	pub file_path: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatientRow {
	pub patient_id: i64,
	pub first_name: String,
	pub last_name: String,
	pub email: Option<String>,
}
impl PatientRow {
	pub fn full_name(&self) -> String {
		format!("{} {}", self.first_name, self.last_name)
	}

	pub fn to_export_patient(&self) -> ExportPatient {
		ExportPatient {
			patient_id: self.patient_id,
			first_name: self.first_name.clone(),
			last_name: self.last_name.clone(),
		}
	}
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DoctorRow {
	pub doctor_id: i64,
	pub first_name: String,
	pub last_name: String,
	pub specialization: String,
	/// Only doctors with a non-blank address are loaded.
	pub email: String,
}
impl DoctorRow {
	pub fn display_name(&self) -> String {
		format!("Dr. {} {}", self.first_name, self.last_name)
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
	pub examination_id: i64,
	pub doctor_first_name: Option<String>,
	pub doctor_last_name: Option<String>,
	pub doctor_specialization: Option<String>,
	pub appointment_date: Option<Date>,
	pub diagnosis: Option<String>,
	pub prescription: Option<String>,
}
impl From<HistoryRow> for TreatmentHistoryRow {
	fn from(row: HistoryRow) -> Self {
		Self {
			examination_id: row.examination_id,
			doctor_first_name: row.doctor_first_name,
			doctor_last_name: row.doctor_last_name,
			doctor_specialization: row.doctor_specialization,
			appointment_date: row.appointment_date,
			diagnosis: row.diagnosis,
			prescription: row.prescription,
		}
	}
}

/// Appointment that qualifies for a reminder: both parties exist and the patient has an
/// address.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReminderRow {
	pub appointment_id: i64,
	pub appointment_date: Date,
	pub patient_id: i64,
	pub patient_first_name: String,
	pub patient_last_name: String,
	pub patient_email: String,
	pub doctor_first_name: String,
	pub doctor_last_name: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DoctorAppointmentRow {
	pub appointment_id: i64,
	pub appointment_date: Date,
	pub patient_first_name: Option<String>,
	pub patient_last_name: Option<String>,
	pub diagnosis: Option<String>,
	pub examination_count: i64,
}
impl From<DoctorAppointmentRow> for ReportAppointment {
	fn from(row: DoctorAppointmentRow) -> Self {
		let patient_name = match (row.patient_first_name, row.patient_last_name) {
			(Some(first), Some(last)) => Some(format!("{first} {last}")),
			_ => None,
		};

		Self {
			appointment_id: row.appointment_id,
			date: row.appointment_date,
			patient_name,
			diagnosis: row.diagnosis,
			examination_count: row.examination_count,
		}
	}
}
