use medex_domain::history::TreatmentHistoryRow;

use crate::{Result, db::Db, models::HistoryRow};

/// Every examination of the patient, in insertion order. Appointment and doctor data is
/// absent when the related rows were deleted.
pub async fn load_treatment_history(db: &Db, patient_id: i64) -> Result<Vec<TreatmentHistoryRow>> {
	let rows = sqlx::query_as::<_, HistoryRow>(
		"\
SELECT
	e.examination_id,
	d.first_name AS doctor_first_name,
	d.last_name AS doctor_last_name,
	d.specialization AS doctor_specialization,
	a.appointment_date,
	e.diagnosis,
	e.prescription
FROM examinations e
LEFT JOIN appointments a ON a.appointment_id = e.appointment_id
LEFT JOIN doctors d ON d.doctor_id = a.doctor_id
WHERE e.patient_id = $1
ORDER BY e.examination_id ASC",
	)
	.bind(patient_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(TreatmentHistoryRow::from).collect())
}
