//! Keyed executor: routing, backpressured submission, quiescence and shutdown.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{ExecutorConfig, RoutingPolicy};
use crate::error::{Result, SubmitError};
use crate::handler::JobHandler;
use crate::mailbox::{MailboxSendError, MailboxSender};
use crate::registry::{ExecutorInfo, Registry, WorkerId};
use crate::stats::{Counters, Progress};
use crate::token::{GenerationClock, WorkerToken};
use crate::worker::{Evict, IdleEviction, Job, WorkerHandle, WorkerSpec, spawn_worker};

/// Runs jobs in submission order per key and concurrently across keys.
///
/// Cloning is cheap and every clone drives the same workers. Dropping the last
/// clone without [`Executor::stop`] cancels all workers: queued jobs are
/// discarded and in-progress handlers run to completion in the background.
///
/// Using an executor after `stop` is a sequencing error; submissions then fail
/// with [`SubmitError::Stopped`].
pub struct Executor<T>
where
	T: Send + 'static,
{
	shared: Arc<Shared<T>>,
}

impl<T> Clone for Executor<T>
where
	T: Send + 'static,
{
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

struct Shared<T>
where
	T: Send + 'static,
{
	config: ExecutorConfig,
	handler: Arc<dyn JobHandler<T>>,
	registry: Mutex<Registry<T>>,
	progress: Arc<Progress>,
	root: CancellationToken,
	tracker: TaskTracker,
	generations: GenerationClock,
}

impl<T> Evict for Shared<T>
where
	T: Send + 'static,
{
	fn remove_if_idle(&self, id: &WorkerId, generation: u64) -> bool {
		match id {
			WorkerId::Key(key) => self.registry.lock().remove_if_idle(key, generation),
			WorkerId::Shard(_) => false,
		}
	}
}

impl<T> Drop for Shared<T>
where
	T: Send + 'static,
{
	fn drop(&mut self) {
		self.root.cancel();
	}
}

/// A job slot counted against a worker before the mailbox send.
///
/// Rolled back on drop unless committed, which also covers a submit future
/// dropped while waiting for mailbox capacity.
struct Reservation<T> {
	tx: MailboxSender<Job<T>>,
	stats: Arc<Counters>,
	progress: Arc<Progress>,
	committed: bool,
}

impl<T> Reservation<T> {
	fn commit(mut self) {
		self.committed = true;
	}
}

impl<T> Drop for Reservation<T> {
	fn drop(&mut self) {
		if !self.committed {
			self.stats.unreserve();
			self.progress.unreserve();
		}
	}
}

impl<T> Executor<T>
where
	T: Send + 'static,
{
	/// Validates `config` and builds an executor around `handler`.
	///
	/// Fixed-shard workers start immediately; elastic workers start on the
	/// first submission for their key. Outside a tokio runtime, workers run on
	/// a shared fallback runtime.
	pub fn new(config: ExecutorConfig, handler: impl JobHandler<T>) -> Result<Self> {
		config.validate()?;

		let handler: Arc<dyn JobHandler<T>> = Arc::new(handler);
		let progress = Arc::new(Progress::default());
		let root = CancellationToken::new();
		let tracker = TaskTracker::new();
		let generations = GenerationClock::new();

		let registry = match config.routing {
			RoutingPolicy::Elastic => Registry::elastic(),
			RoutingPolicy::FixedShard { workers } => Registry::sharded(
				(0..workers)
					.map(|index| {
						let spec = WorkerSpec {
							id: WorkerId::Shard(index),
							token: WorkerToken::child_of(generations.next(), &root),
							capacity: config.mailbox_capacity,
							handler: Arc::clone(&handler),
							progress: Arc::clone(&progress),
							eviction: None,
						};
						spawn_worker(spec, &tracker)
					})
					.collect(),
			),
		};

		tracing::debug!(routing = ?config.routing, capacity = config.mailbox_capacity, idle_timeout = ?config.idle_timeout, "executor.start");

		Ok(Self {
			shared: Arc::new(Shared {
				config,
				handler,
				registry: Mutex::new(registry),
				progress,
				root,
				tracker,
				generations,
			}),
		})
	}

	/// Returns the validated configuration.
	pub fn config(&self) -> &ExecutorConfig {
		&self.shared.config
	}

	/// Hands `payload` to the worker for `key`, creating the worker if needed.
	///
	/// Suspends while that worker's mailbox is full. Only the submitting task
	/// waits: the registry lock is released before the send, so a full mailbox
	/// never stalls submissions for other keys.
	pub async fn submit(&self, key: impl Into<Arc<str>>, payload: T) -> std::result::Result<(), SubmitError> {
		let key = key.into();
		let reservation = self.reserve(&key)?;
		reservation.tx.send(Job { key, payload }).await.map_err(|_| SubmitError::Stopped)?;
		reservation.commit();
		Ok(())
	}

	/// Like [`Self::submit`] but fails with [`SubmitError::Full`] instead of
	/// waiting for mailbox capacity.
	pub fn try_submit(&self, key: impl Into<Arc<str>>, payload: T) -> std::result::Result<(), SubmitError> {
		let key = key.into();
		let reservation = self.reserve(&key)?;
		reservation.tx.try_send(Job { key, payload }).map_err(|err| match err {
			MailboxSendError::Full => SubmitError::Full,
			MailboxSendError::Closed => SubmitError::Stopped,
		})?;
		reservation.commit();
		Ok(())
	}

	/// Snapshot of every live worker's counters plus executor totals.
	pub fn info(&self) -> ExecutorInfo {
		let workers = self.shared.registry.lock().snapshot();
		ExecutorInfo::new(workers, self.shared.progress.snapshot())
	}

	/// Waits until every submitted job has completed.
	///
	/// Returns at the first observed instant where nothing is outstanding.
	/// Jobs submitted concurrently with this call may or may not be covered.
	pub async fn wait(&self) {
		self.shared.progress.wait_settled().await;
	}

	/// Stops every worker and waits for each to exit.
	///
	/// A handler already running finishes first; queued jobs are discarded
	/// and counted. Submitters blocked on a full mailbox fail with
	/// [`SubmitError::Stopped`]. A handler that never returns keeps this
	/// call waiting.
	pub async fn stop(&self) {
		let workers = self.shared.registry.lock().take_all();
		tracing::debug!(workers = workers.len(), "executor.stop");

		self.shared.root.cancel();
		for worker in &workers {
			worker.close();
		}
		self.shared.tracker.close();
		self.shared.tracker.wait().await;

		tracing::debug!(totals = ?self.shared.progress.snapshot(), "executor.stopped");
	}

	/// Returns `true` once [`Self::stop`] has been called.
	pub fn is_stopped(&self) -> bool {
		self.shared.registry.lock().is_stopped()
	}

	/// Counts a job against its worker under the registry lock, creating an
	/// elastic worker on first use.
	fn reserve(&self, key: &Arc<str>) -> std::result::Result<Reservation<T>, SubmitError> {
		let mut registry = self.shared.registry.lock();
		if registry.is_stopped() {
			return Err(SubmitError::Stopped);
		}
		let worker = registry.route_or_spawn(key, || self.spawn_elastic(key));
		worker.stats().reserve();
		self.shared.progress.reserve();
		Ok(Reservation {
			tx: worker.sender(),
			stats: Arc::clone(worker.stats()),
			progress: Arc::clone(&self.shared.progress),
			committed: false,
		})
	}

	fn spawn_elastic(&self, key: &Arc<str>) -> WorkerHandle<T> {
		let shared = &self.shared;
		let owner: Weak<dyn Evict> = Arc::downgrade(shared) as Weak<dyn Evict>;
		let spec = WorkerSpec {
			id: WorkerId::Key(Arc::clone(key)),
			token: WorkerToken::child_of(shared.generations.next(), &shared.root),
			capacity: shared.config.mailbox_capacity,
			handler: Arc::clone(&shared.handler),
			progress: Arc::clone(&shared.progress),
			eviction: Some(IdleEviction {
				timeout: shared.config.idle_timeout,
				owner,
			}),
		};
		spawn_worker(spec, &shared.tracker)
	}
}
