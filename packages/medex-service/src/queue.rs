//! Bounded worker pool that turns queued export ids into finished exports.

use std::{
	mem,
	sync::{
		Arc, Mutex,
		atomic::{AtomicU64, Ordering},
	},
};

use tokio::{
	sync::{Mutex as AsyncMutex, mpsc},
	task::JoinHandle,
};

use crate::{BoxFuture, MedexService, ProcessOutcome, Result};

pub trait ExportProcessor
where
	Self: Send + Sync + 'static,
{
	fn process(&self, export_id: i64) -> BoxFuture<'_, Result<ProcessOutcome>>;
}
impl ExportProcessor for MedexService {
	fn process(&self, export_id: i64) -> BoxFuture<'_, Result<ProcessOutcome>> {
		Box::pin(self.process_one(export_id))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
	#[error("Export queue is full.")]
	Full,
	#[error("Export queue is closed.")]
	Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
	pub enqueued: u64,
	pub completed: u64,
	pub failed: u64,
	/// Ids whose processing returned an error, lost claims included.
	pub errored: u64,
}

#[derive(Default)]
struct Counters {
	enqueued: AtomicU64,
	completed: AtomicU64,
	failed: AtomicU64,
	errored: AtomicU64,
}
impl Counters {
	fn snapshot(&self) -> QueueStats {
		QueueStats {
			enqueued: self.enqueued.load(Ordering::Relaxed),
			completed: self.completed.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			errored: self.errored.load(Ordering::Relaxed),
		}
	}
}

pub struct ExportQueue {
	sender: Mutex<Option<mpsc::Sender<i64>>>,
	workers: Mutex<Vec<JoinHandle<()>>>,
	counters: Arc<Counters>,
}
impl ExportQueue {
	/// Spawns `workers` tasks sharing one channel of `capacity` ids. Both are clamped to at
	/// least one.
	pub fn start<P>(processor: Arc<P>, workers: usize, capacity: usize) -> Self
	where
		P: ExportProcessor + ?Sized,
	{
		let (sender, receiver) = mpsc::channel(capacity.max(1));
		let receiver = Arc::new(AsyncMutex::new(receiver));
		let counters = Arc::new(Counters::default());
		let handles = (0..workers.max(1))
			.map(|worker| {
				tokio::spawn(run_worker(
					worker,
					processor.clone(),
					receiver.clone(),
					counters.clone(),
				))
			})
			.collect();

		tracing::info!(workers = workers.max(1), capacity = capacity.max(1), "Export queue started.");

		Self { sender: Mutex::new(Some(sender)), workers: Mutex::new(handles), counters }
	}

	pub fn enqueue(&self, export_id: i64) -> Result<(), QueueError> {
		let guard = self.sender.lock().unwrap_or_else(|err| err.into_inner());
		let Some(sender) = guard.as_ref() else {
			return Err(QueueError::Closed);
		};

		sender.try_send(export_id).map_err(|err| match err {
			mpsc::error::TrySendError::Full(_) => QueueError::Full,
			mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
		})?;

		self.counters.enqueued.fetch_add(1, Ordering::Relaxed);

		tracing::debug!(export_id, "Export enqueued.");

		Ok(())
	}

	pub fn stats(&self) -> QueueStats {
		self.counters.snapshot()
	}

	/// Stops accepting ids and waits until the workers have drained what is already queued.
	pub async fn shutdown(&self) -> QueueStats {
		drop(self.sender.lock().unwrap_or_else(|err| err.into_inner()).take());

		let handles = mem::take(&mut *self.workers.lock().unwrap_or_else(|err| err.into_inner()));

		for handle in handles {
			if let Err(err) = handle.await {
				tracing::error!(error = %err, "Export worker panicked.");
			}
		}

		let stats = self.stats();

		tracing::info!(?stats, "Export queue drained.");

		stats
	}
}

async fn run_worker<P>(
	worker: usize,
	processor: Arc<P>,
	receiver: Arc<AsyncMutex<mpsc::Receiver<i64>>>,
	counters: Arc<Counters>,
) where
	P: ExportProcessor + ?Sized,
{
	loop {
		let next = receiver.lock().await.recv().await;
		let Some(export_id) = next else {
			break;
		};

		match processor.process(export_id).await {
			Ok(ProcessOutcome::Completed { notified, .. }) => {
				counters.completed.fetch_add(1, Ordering::Relaxed);

				tracing::info!(worker, export_id, notified, "Queued export completed.");
			},
			Ok(ProcessOutcome::Failed { error }) => {
				counters.failed.fetch_add(1, Ordering::Relaxed);

				tracing::warn!(worker, export_id, %error, "Queued export failed.");
			},
			Err(err) => {
				counters.errored.fetch_add(1, Ordering::Relaxed);

				tracing::error!(worker, export_id, error = %err, "Queued export errored.");
			},
		}
	}

	tracing::debug!(worker, "Export worker stopped.");
}
