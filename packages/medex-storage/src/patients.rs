use crate::{Result, db::Db, models::PatientRow};

pub async fn fetch_patient(db: &Db, patient_id: i64) -> Result<Option<PatientRow>> {
	let row = sqlx::query_as::<_, PatientRow>(
		"\
SELECT patient_id, first_name, last_name, email
FROM patients
WHERE patient_id = $1",
	)
	.bind(patient_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}
