use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation clock for worker lifecycles.
///
/// A key that is evicted and later reused gets a worker with a fresh
/// generation, so a stale eviction request can never remove its successor.
#[derive(Debug, Default, Clone)]
pub(crate) struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Generation-scoped stop token for one worker.
#[derive(Debug, Clone)]
pub(crate) struct WorkerToken {
	generation: u64,
	cancel: CancellationToken,
}

impl WorkerToken {
	/// Creates a token for `generation` that fires when `parent` does.
	pub fn child_of(generation: u64, parent: &CancellationToken) -> Self {
		Self {
			generation,
			cancel: parent.child_token(),
		}
	}

	/// Returns generation ID.
	pub const fn generation(&self) -> u64 {
		self.generation
	}

	/// Returns true when a stop was requested.
	pub fn is_stopped(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Future resolving when a stop is requested.
	pub async fn stopped(&self) {
		self.cancel.cancelled().await;
	}
}
