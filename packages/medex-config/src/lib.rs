mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Exports, Jobs, Mail, Postgres, Security, Service, Storage};

use std::{fs, path::Path, str::FromStr};

use cron::Schedule;

/// Longest export retention accepted, about ten years.
pub const MAX_RETENTION_DAYS: i64 = 3_650;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if !(cfg.service.public_base_url.starts_with("http://")
		|| cfg.service.public_base_url.starts_with("https://"))
	{
		return Err(Error::Validation {
			message: "service.public_base_url must start with http:// or https://.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.exports.dir.trim().is_empty() {
		return Err(Error::Validation { message: "exports.dir must be non-empty.".to_string() });
	}
	if cfg.exports.retention_days <= 0 {
		return Err(Error::Validation {
			message: "exports.retention_days must be greater than zero.".to_string(),
		});
	}
	if cfg.exports.retention_days > MAX_RETENTION_DAYS {
		return Err(Error::Validation {
			message: format!("exports.retention_days must be at most {MAX_RETENTION_DAYS}."),
		});
	}
	if cfg.exports.workers == 0 {
		return Err(Error::Validation {
			message: "exports.workers must be greater than zero.".to_string(),
		});
	}
	if cfg.exports.queue_capacity == 0 {
		return Err(Error::Validation {
			message: "exports.queue_capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.mail.api_key.trim().is_empty() {
		return Err(Error::Validation { message: "mail.api_key must be non-empty.".to_string() });
	}
	if !cfg.mail.sender.contains('@') {
		return Err(Error::Validation {
			message: "mail.sender must be an email address.".to_string(),
		});
	}
	if cfg.mail.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "mail.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.mail.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::Validation {
			message: "mail.default_headers values must be strings.".to_string(),
		});
	}

	for (field, expression) in job_schedules(&cfg.jobs) {
		if expression.is_empty() {
			continue;
		}

		Schedule::from_str(expression)
			.map_err(|err| Error::InvalidCron { field: field.to_string(), source: err })?;
	}

	Ok(())
}

/// Pairs each job's config key with its cron expression.
pub fn job_schedules(jobs: &Jobs) -> [(&'static str, &str); 4] {
	[
		("jobs.daily_reminder", jobs.daily_reminder.as_str()),
		("jobs.monthly_report", jobs.monthly_report.as_str()),
		("jobs.export_cleanup", jobs.export_cleanup.as_str()),
		("jobs.pending_sweep", jobs.pending_sweep.as_str()),
	]
}

fn normalize(cfg: &mut Config) {
	if cfg.security.api_auth_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.api_auth_token = None;
	}

	let trimmed = cfg.service.public_base_url.trim().trim_end_matches('/').to_string();

	cfg.service.public_base_url = trimmed;

	for expression in [
		&mut cfg.jobs.daily_reminder,
		&mut cfg.jobs.monthly_report,
		&mut cfg.jobs.export_cleanup,
		&mut cfg.jobs.pending_sweep,
	] {
		let trimmed = expression.trim().to_string();

		*expression = trimmed;
	}
}
