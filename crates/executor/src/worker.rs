//! Per-key worker: one bounded mailbox drained in order by one task.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinError;
use tokio_util::task::TaskTracker;

use crate::TaskClass;
use crate::handler::JobHandler;
use crate::mailbox::{Mailbox, MailboxReceiver, MailboxSender};
use crate::registry::WorkerId;
use crate::stats::{Counters, JobCounters, Progress};
use crate::token::WorkerToken;

/// One submitted unit of work.
pub(crate) struct Job<T> {
	pub key: Arc<str>,
	pub payload: T,
}

/// Owner a worker asks for permission to retire.
pub(crate) trait Evict: Send + Sync {
	/// Removes worker `id` of `generation` from routing if it holds no
	/// reserved job. Returns `true` when the worker must exit.
	fn remove_if_idle(&self, id: &WorkerId, generation: u64) -> bool;
}

/// Idle self-eviction settings for elastic workers.
pub(crate) struct IdleEviction {
	pub timeout: Duration,
	pub owner: Weak<dyn Evict>,
}

/// Why a worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
	Stopped,
	Evicted,
	MailboxClosed,
}

/// Everything needed to start one worker.
pub(crate) struct WorkerSpec<T>
where
	T: Send + 'static,
{
	pub id: WorkerId,
	pub token: WorkerToken,
	pub capacity: usize,
	pub handler: Arc<dyn JobHandler<T>>,
	pub progress: Arc<Progress>,
	pub eviction: Option<IdleEviction>,
}

/// Registry-side handle for a running worker.
pub(crate) struct WorkerHandle<T> {
	id: WorkerId,
	generation: u64,
	tx: MailboxSender<Job<T>>,
	stats: Arc<Counters>,
}

impl<T> WorkerHandle<T> {
	pub fn id(&self) -> &WorkerId {
		&self.id
	}

	pub const fn generation(&self) -> u64 {
		self.generation
	}

	pub fn sender(&self) -> MailboxSender<Job<T>> {
		self.tx.clone()
	}

	pub fn stats(&self) -> &Arc<Counters> {
		&self.stats
	}

	pub fn snapshot(&self) -> JobCounters {
		self.stats.snapshot()
	}

	/// Closes the mailbox, failing blocked and future sends.
	pub fn close(&self) {
		self.tx.close();
	}
}

/// Starts a worker task on `tracker` and returns its handle.
pub(crate) fn spawn_worker<T>(spec: WorkerSpec<T>, tracker: &TaskTracker) -> WorkerHandle<T>
where
	T: Send + 'static,
{
	let (tx, rx) = Mailbox::new(spec.capacity).split();
	let stats = Arc::new(Counters::default());
	let generation = spec.token.generation();

	tracing::debug!(worker = %spec.id, generation, capacity = spec.capacity, "executor.worker.spawn");

	let worker = Worker {
		id: spec.id.clone(),
		token: spec.token,
		rx,
		handler: spec.handler,
		stats: Arc::clone(&stats),
		progress: spec.progress,
		eviction: spec.eviction,
	};
	crate::spawn::spawn_tracked(TaskClass::Worker, tracker, worker.run());

	WorkerHandle {
		id: spec.id,
		generation,
		tx,
		stats,
	}
}

struct Worker<T>
where
	T: Send + 'static,
{
	id: WorkerId,
	token: WorkerToken,
	rx: MailboxReceiver<Job<T>>,
	handler: Arc<dyn JobHandler<T>>,
	stats: Arc<Counters>,
	progress: Arc<Progress>,
	eviction: Option<IdleEviction>,
}

impl<T> Worker<T>
where
	T: Send + 'static,
{
	async fn run(self) {
		let exit = loop {
			let job = tokio::select! {
				biased;
				_ = self.token.stopped() => break WorkerExit::Stopped,
				msg = self.rx.recv() => {
					let Some(job) = msg else {
						break WorkerExit::MailboxClosed;
					};
					job
				}
				_ = idle_tick(self.eviction.as_ref()) => {
					if self.try_evict() {
						break WorkerExit::Evicted;
					}
					continue;
				}
			};

			// No mid-job cancellation: a stop only prevents the next dequeue.
			self.process(job).await;
			if self.token.is_stopped() {
				break WorkerExit::Stopped;
			}
		};

		let leftovers = self.rx.close_and_drain().len() as u64;
		if leftovers > 0 {
			self.stats.discard(leftovers);
			self.progress.discard(leftovers);
		}

		tracing::debug!(
			worker = %self.id,
			generation = self.token.generation(),
			reason = ?exit,
			discarded = leftovers,
			counters = ?self.stats.snapshot(),
			"executor.worker.exit"
		);
	}

	fn try_evict(&self) -> bool {
		// Cheap unlocked look first; the owner re-checks under its lock.
		if self.rx.queued() > 0 {
			return false;
		}
		let Some(owner) = self.eviction.as_ref().and_then(|eviction| eviction.owner.upgrade()) else {
			return true;
		};
		owner.remove_if_idle(&self.id, self.token.generation())
	}

	async fn process(&self, job: Job<T>) {
		let Job { key, payload } = job;
		let handler = Arc::clone(&self.handler);
		let task_key = Arc::clone(&key);

		// Run the handler in its own task so a panic surfaces as a join error
		// instead of unwinding through the worker loop.
		let outcome = crate::spawn(TaskClass::Job, async move { handler.handle(&task_key, payload).await }).await;

		let failed = match outcome {
			Ok(Ok(())) => false,
			Ok(Err(err)) => {
				tracing::warn!(worker = %self.id, %key, generation = self.token.generation(), error = %format!("{err:#}"), "executor.job.failed");
				true
			}
			Err(err) => {
				let panic = join_error_panic_message(err);
				tracing::warn!(worker = %self.id, %key, generation = self.token.generation(), panic = ?panic, "executor.job.aborted");
				true
			}
		};

		self.rx.ack();
		self.stats.finish(failed);
		self.progress.finish(failed);
	}
}

async fn idle_tick(eviction: Option<&IdleEviction>) {
	match eviction {
		Some(eviction) => tokio::time::sleep(eviction.timeout).await,
		None => std::future::pending().await,
	}
}

/// Extracts the panic message from a join error, if it was a panic.
pub(crate) fn join_error_panic_message(err: JoinError) -> Option<String> {
	let payload = err.try_into_panic().ok()?;
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_owned());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("<non-string panic payload>".to_owned())
}
