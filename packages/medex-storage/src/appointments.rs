use time::Date;

use medex_domain::report::{ReportAppointment, ReportPeriod};

use crate::{
	Result,
	db::Db,
	models::{DoctorAppointmentRow, DoctorRow, ReminderRow},
};

pub async fn list_reminder_targets(db: &Db, date: Date) -> Result<Vec<ReminderRow>> {
	let rows = sqlx::query_as::<_, ReminderRow>(
		"\
SELECT
	a.appointment_id,
	a.appointment_date,
	p.patient_id,
	p.first_name AS patient_first_name,
	p.last_name AS patient_last_name,
	p.email AS patient_email,
	d.first_name AS doctor_first_name,
	d.last_name AS doctor_last_name
FROM appointments a
JOIN patients p ON p.patient_id = a.patient_id
JOIN doctors d ON d.doctor_id = a.doctor_id
WHERE a.appointment_date = $1
	AND p.email IS NOT NULL
	AND btrim(p.email) <> ''
ORDER BY a.appointment_id ASC",
	)
	.bind(date)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn list_report_doctors(db: &Db) -> Result<Vec<DoctorRow>> {
	let rows = sqlx::query_as::<_, DoctorRow>(
		"\
SELECT doctor_id, first_name, last_name, specialization, email
FROM doctors
WHERE email IS NOT NULL
	AND btrim(email) <> ''
ORDER BY doctor_id ASC",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Appointments of one doctor inside the period, with the first examination's diagnosis.
pub async fn list_doctor_appointments(
	db: &Db,
	doctor_id: i64,
	period: ReportPeriod,
) -> Result<Vec<ReportAppointment>> {
	let rows = sqlx::query_as::<_, DoctorAppointmentRow>(
		"\
SELECT
	a.appointment_id,
	a.appointment_date,
	p.first_name AS patient_first_name,
	p.last_name AS patient_last_name,
	(
		SELECT e.diagnosis
		FROM examinations e
		WHERE e.appointment_id = a.appointment_id
		ORDER BY e.examination_id ASC
		LIMIT 1
	) AS diagnosis,
	(
		SELECT count(*)
		FROM examinations e
		WHERE e.appointment_id = a.appointment_id
	) AS examination_count
FROM appointments a
LEFT JOIN patients p ON p.patient_id = a.patient_id
WHERE a.doctor_id = $1
	AND a.appointment_date BETWEEN $2 AND $3
ORDER BY a.appointment_date ASC, a.appointment_id ASC",
	)
	.bind(doctor_id)
	.bind(period.start)
	.bind(period.end)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(ReportAppointment::from).collect())
}
