use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

/// Point-in-time job counters for one worker or a whole executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounters {
	/// Jobs accepted for this worker.
	pub submitted: u64,
	/// Jobs whose handler returned, successfully or not.
	pub completed: u64,
	/// Completed jobs whose handler returned an error or panicked.
	pub failed: u64,
	/// Jobs dropped unhandled because the executor stopped.
	pub discarded: u64,
}

impl JobCounters {
	/// Jobs accepted but neither completed nor discarded.
	pub fn pending(&self) -> u64 {
		self.submitted.saturating_sub(self.completed + self.discarded)
	}
}

/// Live counters behind a [`JobCounters`] snapshot.
#[derive(Debug, Default)]
pub(crate) struct Counters {
	submitted: AtomicU64,
	completed: AtomicU64,
	failed: AtomicU64,
	discarded: AtomicU64,
}

impl Counters {
	pub fn reserve(&self) {
		self.submitted.fetch_add(1, Ordering::AcqRel);
	}

	/// Undoes a [`Self::reserve`] whose job never reached a mailbox.
	pub fn unreserve(&self) {
		self.submitted.fetch_sub(1, Ordering::AcqRel);
	}

	pub fn finish(&self, failed: bool) {
		if failed {
			self.failed.fetch_add(1, Ordering::AcqRel);
		}
		self.completed.fetch_add(1, Ordering::AcqRel);
	}

	pub fn discard(&self, count: u64) {
		self.discarded.fetch_add(count, Ordering::AcqRel);
	}

	/// Reserved jobs not yet completed or discarded.
	pub fn outstanding(&self) -> u64 {
		// Load `submitted` first: a later completion can only raise the
		// finished side, never make an unfinished job look finished.
		let submitted = self.submitted.load(Ordering::Acquire);
		let finished = self.completed.load(Ordering::Acquire) + self.discarded.load(Ordering::Acquire);
		submitted.saturating_sub(finished)
	}

	pub fn snapshot(&self) -> JobCounters {
		JobCounters {
			submitted: self.submitted.load(Ordering::Acquire),
			completed: self.completed.load(Ordering::Acquire),
			failed: self.failed.load(Ordering::Acquire),
			discarded: self.discarded.load(Ordering::Acquire),
		}
	}
}

/// Executor-wide counters plus a signal fired on every settle-relevant change.
#[derive(Debug, Default)]
pub(crate) struct Progress {
	totals: Counters,
	changed: Notify,
}

impl Progress {
	pub fn reserve(&self) {
		self.totals.reserve();
	}

	pub fn unreserve(&self) {
		self.totals.unreserve();
		self.changed.notify_waiters();
	}

	pub fn finish(&self, failed: bool) {
		self.totals.finish(failed);
		self.changed.notify_waiters();
	}

	pub fn discard(&self, count: u64) {
		self.totals.discard(count);
		self.changed.notify_waiters();
	}

	pub fn snapshot(&self) -> JobCounters {
		self.totals.snapshot()
	}

	/// Waits for the first observed instant with nothing outstanding.
	///
	/// Jobs submitted concurrently may keep this waiting, or may start right
	/// after it returns.
	pub async fn wait_settled(&self) {
		loop {
			let notified = self.changed.notified();
			if self.totals.outstanding() == 0 {
				return;
			}
			notified.await;
		}
	}
}
