//! Monthly doctor activity report.

use time::Date;

/// Inclusive calendar window covered by one report run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
	pub start: Date,
	pub end: Date,
}
impl ReportPeriod {
	/// The calendar month before the one containing `today`.
	pub fn previous_month(today: Date) -> Self {
		let first_of_month = today.replace_day(1).unwrap_or(today);
		let end = first_of_month.previous_day().unwrap_or(first_of_month);
		let start = end.replace_day(1).unwrap_or(end);

		Self { start, end }
	}

	pub fn label(&self) -> String {
		format!("{} {}", self.start.month(), self.start.year())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportAppointment {
	pub appointment_id: i64,
	pub date: Date,
	pub patient_name: Option<String>,
	/// Diagnosis of the first examination recorded for the appointment.
	pub diagnosis: Option<String>,
	pub examination_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorReport {
	pub doctor_name: String,
	pub specialization: String,
	pub period: ReportPeriod,
	pub appointments: Vec<ReportAppointment>,
}
impl DoctorReport {
	pub fn total_appointments(&self) -> usize {
		self.appointments.len()
	}

	pub fn total_examinations(&self) -> i64 {
		self.appointments.iter().map(|appointment| appointment.examination_count).sum()
	}

	pub fn examined_share(&self) -> f64 {
		if self.appointments.is_empty() {
			return 0.0;
		}

		let examined =
			self.appointments.iter().filter(|appointment| appointment.examination_count > 0).count();

		examined as f64 / self.appointments.len() as f64
	}
}
