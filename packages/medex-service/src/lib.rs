pub mod exports;
pub mod jobs;
pub mod pipeline;
pub mod queue;
pub mod time_serde;

mod error;

pub use error::{Error, Result};
pub use exports::{DownloadFile, ExportList, ExportRequestResponse, ExportView};
pub use jobs::{CleanupReport, JobReport};
pub use pipeline::{BatchReport, GeneratedExport, ProcessOutcome};
pub use queue::{ExportProcessor, ExportQueue, QueueError, QueueStats};

use std::{future::Future, pin::Pin, sync::Arc};

use medex_config::Config;
use medex_domain::mail::{MailTemplates, OutgoingMail};
use medex_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Mailer
where
	Self: Send + Sync,
{
	fn send<'a>(
		&'a self,
		cfg: &'a medex_config::Mail,
		mail: &'a OutgoingMail,
	) -> BoxFuture<'a, Result<()>>;
}

pub struct MedexService {
	pub cfg: Config,
	pub db: Db,
	pub mailer: Arc<dyn Mailer>,
	pub templates: MailTemplates,
}
impl MedexService {
	pub fn new(cfg: Config, db: Db) -> Result<Self> {
		Self::with_mailer(cfg, db, Arc::new(RelayMailer))
	}

	/// Compiles the mail templates once; fails only if a bundled template is malformed.
	pub fn with_mailer(cfg: Config, db: Db, mailer: Arc<dyn Mailer>) -> Result<Self> {
		Ok(Self { cfg, db, mailer, templates: MailTemplates::new()? })
	}

	pub(crate) async fn send_mail(&self, mail: &OutgoingMail) -> Result<()> {
		self.mailer.send(&self.cfg.mail, mail).await
	}
}

struct RelayMailer;
impl Mailer for RelayMailer {
	fn send<'a>(
		&'a self,
		cfg: &'a medex_config::Mail,
		mail: &'a OutgoingMail,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let delivery = medex_providers::mail::send(cfg, mail).await?;

			tracing::debug!(to = %mail.to, message_id = ?delivery.message_id, "Mail handed to relay.");

			Ok(())
		})
	}
}
