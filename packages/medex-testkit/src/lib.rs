//! Per-test Postgres databases for the ignored integration suites.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::runtime::Builder;
use uuid::Uuid;

pub const DSN_ENV: &str = "MEDEX_PG_DSN";

/// Databases tried, in order, to issue `CREATE DATABASE` and `DROP DATABASE` from.
const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A fresh database on the server `MEDEX_PG_DSN` points at. `cleanup` drops it; a value
/// dropped without `cleanup` is removed from a short-lived runtime on another thread.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn).map_err(Error::InvalidDsn)?;
		let (maintenance, mut conn) = open_maintenance(&base).await?;
		let name = database_name(Uuid::new_v4());
		let sql = format!(r#"CREATE DATABASE "{name}""#);

		conn.execute(sql.as_str())
			.await
			.map_err(|source| Error::Create { name: name.clone(), source })?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.name, &self.maintenance).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = std::mem::take(&mut self.name);
		let maintenance = self.maintenance.clone();
		let handle = thread::spawn(move || {
			let result = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| err.to_string())
				.and_then(|runtime| {
					runtime.block_on(drop_database(&name, &maintenance)).map_err(|err| err.to_string())
				});

			if let Err(err) = result {
				eprintln!("Leaked test database {name}: {err}");
			}
		});

		let _ = handle.join();
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok().filter(|dsn| !dsn.trim().is_empty())
}

fn database_name(id: Uuid) -> String {
	format!("medex_test_{}", id.simple())
}

async fn open_maintenance(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::NoMaintenanceDatabase(failures.join("; ")))
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	// Pooled connections from the test may still be open; a refused terminate surfaces as a
	// failed drop below.
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.execute(&mut conn)
	.await;

	let sql = format!(r#"DROP DATABASE IF EXISTS "{name}""#);

	conn.execute(sql.as_str())
		.await
		.map_err(|source| Error::Drop { name: name.to_string(), source })?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn database_names_are_plain_identifiers() {
		let name = database_name(Uuid::new_v4());

		assert!(name.starts_with("medex_test_"));
		assert!(name.len() <= 63);
		assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
	}

	#[tokio::test]
	async fn malformed_dsn_is_rejected_before_connecting() {
		assert!(matches!(
			TestDatabase::new("not a dsn").await,
			Err(Error::InvalidDsn(_))
		));
	}
}
