//! Treatment-history CSV artifact.

use std::io::Write;

use time::{Date, OffsetDateTime, macros::format_description};

pub const EXPORT_COLUMNS: [&str; 8] = [
	"Patient ID",
	"Patient Name",
	"Doctor Name",
	"Doctor Specialization",
	"Appointment Date",
	"Diagnosis",
	"Treatment/Prescription",
	"Next Visit",
];
pub const PLACEHOLDER: &str = "N/A";
pub const NEXT_VISIT_TEXT: &str = "As per doctor recommendation";

/// One examination of the exporting patient with whatever related data still exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentHistoryRow {
	pub examination_id: i64,
	pub doctor_first_name: Option<String>,
	pub doctor_last_name: Option<String>,
	pub doctor_specialization: Option<String>,
	pub appointment_date: Option<Date>,
	pub diagnosis: Option<String>,
	pub prescription: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPatient {
	pub patient_id: i64,
	pub first_name: String,
	pub last_name: String,
}
impl ExportPatient {
	pub fn full_name(&self) -> String {
		format!("{} {}", self.first_name, self.last_name)
	}
}

pub fn doctor_display_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
	match (first, last) {
		(Some(first), Some(last)) => Some(format!("Dr. {first} {last}")),
		_ => None,
	}
}

pub fn format_date(date: Date) -> String {
	let format = format_description!("[year]-[month]-[day]");

	date.format(&format).unwrap_or_else(|_| date.to_string())
}

/// Renders one CSV record in [`EXPORT_COLUMNS`] order.
pub fn csv_fields(patient: &ExportPatient, row: &TreatmentHistoryRow) -> [String; 8] {
	let doctor_name =
		doctor_display_name(row.doctor_first_name.as_deref(), row.doctor_last_name.as_deref());

	[
		patient.patient_id.to_string(),
		patient.full_name(),
		or_placeholder(doctor_name.as_deref()),
		or_placeholder(row.doctor_specialization.as_deref()),
		row.appointment_date.map(format_date).unwrap_or_else(|| PLACEHOLDER.to_string()),
		or_placeholder(row.diagnosis.as_deref()),
		or_placeholder(row.prescription.as_deref()),
		NEXT_VISIT_TEXT.to_string(),
	]
}

/// Writes the header and one record per row, keeping the input order. Returns the data row
/// count.
pub fn write_csv<W>(writer: W, patient: &ExportPatient, rows: &[TreatmentHistoryRow]) -> csv::Result<usize>
where
	W: Write,
{
	let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);

	csv_writer.write_record(EXPORT_COLUMNS)?;

	for row in rows {
		csv_writer.write_record(csv_fields(patient, row))?;
	}

	csv_writer.flush()?;

	Ok(rows.len())
}

pub fn export_file_name(
	patient_id: i64,
	export_id: i64,
	extension: &str,
	now: OffsetDateTime,
) -> String {
	let format = format_description!("[year][month][day]_[hour][minute][second]");
	let stamp = now.format(&format).unwrap_or_else(|_| now.unix_timestamp().to_string());

	format!("patient_{patient_id}_export_{export_id}_{stamp}.{extension}")
}

fn or_placeholder(value: Option<&str>) -> String {
	match value.map(str::trim) {
		Some(text) if !text.is_empty() => text.to_string(),
		_ => PLACEHOLDER.to_string(),
	}
}
