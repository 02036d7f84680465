pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_patients.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_patients.sql")),
				"tables/002_doctors.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_doctors.sql")),
				"tables/003_appointments.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_appointments.sql")),
				"tables/004_examinations.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_examinations.sql")),
				"tables/005_treatment_exports.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_treatment_exports.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_are_expanded_in_dependency_order() {
		let sql = render_schema();
		let position = |table: &str| {
			sql.find(&format!("CREATE TABLE IF NOT EXISTS {table} ("))
				.unwrap_or_else(|| panic!("Missing table {table}."))
		};

		assert!(!sql.contains("\\ir"));
		assert!(position("patients") < position("appointments"));
		assert!(position("doctors") < position("appointments"));
		assert!(position("appointments") < position("examinations"));
		assert!(position("patients") < position("treatment_exports"));
	}
}
