use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub exports: Exports,
	pub mail: Mail,
	pub jobs: Jobs,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	/// Base of the download links placed in export notifications, e.g. "https://records.example".
	pub public_base_url: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Exports {
	/// Directory receiving one CSV file per completed export. Created on demand.
	pub dir: String,
	#[serde(default = "default_retention_days")]
	pub retention_days: i64,
	#[serde(default = "default_export_workers")]
	pub workers: usize,
	#[serde(default = "default_queue_capacity")]
	pub queue_capacity: usize,
	/// Attach the generated file to the "export ready" email in addition to the link.
	#[serde(default)]
	pub attach_file: bool,
}

#[derive(Debug, Deserialize)]
pub struct Mail {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub sender: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// Cron expressions (seconds first) for the worker's scheduled jobs. An empty expression
/// disables the job.
#[derive(Debug, Deserialize)]
pub struct Jobs {
	#[serde(default = "default_daily_reminder")]
	pub daily_reminder: String,
	#[serde(default = "default_monthly_report")]
	pub monthly_report: String,
	#[serde(default = "default_export_cleanup")]
	pub export_cleanup: String,
	#[serde(default = "default_pending_sweep")]
	pub pending_sweep: String,
	/// Appointment time shown in reminders. Appointments only carry a date.
	#[serde(default = "default_reminder_time_label")]
	pub reminder_time_label: String,
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	pub api_auth_token: Option<String>,
}

fn default_retention_days() -> i64 {
	7
}

fn default_export_workers() -> usize {
	2
}

fn default_queue_capacity() -> usize {
	64
}

fn default_daily_reminder() -> String {
	"0 0 8 * * *".to_string()
}

fn default_monthly_report() -> String {
	"0 0 9 1 * *".to_string()
}

fn default_export_cleanup() -> String {
	"0 0 2 * * *".to_string()
}

fn default_pending_sweep() -> String {
	"0 */5 * * * *".to_string()
}

fn default_reminder_time_label() -> String {
	"09:00 AM".to_string()
}
