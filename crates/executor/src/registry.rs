use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::route::shard_for;
use crate::stats::JobCounters;
use crate::worker::WorkerHandle;

/// Identity of one live worker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkerId {
	/// Elastic worker serving exactly one key.
	Key(Arc<str>),
	/// Fixed-shard worker serving every key that hashes to this index.
	Shard(usize),
}

impl fmt::Display for WorkerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Key(key) => f.write_str(key),
			Self::Shard(index) => write!(f, "shard-{index}"),
		}
	}
}

/// Point-in-time view of an executor's workers and totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorInfo {
	workers: BTreeMap<WorkerId, JobCounters>,
	totals: JobCounters,
}

impl ExecutorInfo {
	pub(crate) fn new(workers: BTreeMap<WorkerId, JobCounters>, totals: JobCounters) -> Self {
		Self { workers, totals }
	}

	/// Counters of the elastic worker for `key`, if one is live.
	pub fn key(&self, key: &str) -> Option<&JobCounters> {
		self.workers.get(&WorkerId::Key(Arc::from(key)))
	}

	/// Counters of fixed-shard worker `index`.
	pub fn shard(&self, index: usize) -> Option<&JobCounters> {
		self.workers.get(&WorkerId::Shard(index))
	}

	/// Live workers, ordered by id.
	pub fn workers(&self) -> impl Iterator<Item = (&WorkerId, &JobCounters)> {
		self.workers.iter()
	}

	/// Number of live workers.
	pub fn len(&self) -> usize {
		self.workers.len()
	}

	/// Returns `true` when no worker is live.
	pub fn is_empty(&self) -> bool {
		self.workers.is_empty()
	}

	/// Executor-wide counters, including jobs of already evicted workers.
	pub fn totals(&self) -> JobCounters {
		self.totals
	}
}

enum Routes<T> {
	Elastic(HashMap<Arc<str>, WorkerHandle<T>>),
	Sharded(Vec<WorkerHandle<T>>),
}

/// Routing table guarded by the executor's registry lock.
///
/// Every mutation happens under that one lock, which is what keeps
/// lookup-or-create and idle eviction for the same key from interleaving.
pub(crate) struct Registry<T> {
	routes: Routes<T>,
	stopped: bool,
}

impl<T> Registry<T> {
	pub fn elastic() -> Self {
		Self {
			routes: Routes::Elastic(HashMap::new()),
			stopped: false,
		}
	}

	pub fn sharded(workers: Vec<WorkerHandle<T>>) -> Self {
		Self {
			routes: Routes::Sharded(workers),
			stopped: false,
		}
	}

	pub fn is_stopped(&self) -> bool {
		self.stopped
	}

	/// Returns the worker for `key`, creating it with `spawn` if the elastic
	/// table has none. Fixed-shard tables never create.
	pub fn route_or_spawn(&mut self, key: &Arc<str>, spawn: impl FnOnce() -> WorkerHandle<T>) -> &WorkerHandle<T> {
		match &mut self.routes {
			Routes::Elastic(map) => &*map.entry(Arc::clone(key)).or_insert_with(spawn),
			Routes::Sharded(shards) => {
				let index = shard_for(key, shards.len());
				&shards[index]
			}
		}
	}

	/// Removes an elastic worker that has nothing reserved.
	///
	/// Returns `true` when the caller must exit: either it was removed now, or
	/// the table no longer routes to this generation at all.
	pub fn remove_if_idle(&mut self, key: &str, generation: u64) -> bool {
		let Routes::Elastic(map) = &mut self.routes else {
			return false;
		};
		let Some(worker) = map.get(key) else {
			return true;
		};
		if worker.generation() != generation {
			return true;
		}
		if worker.stats().outstanding() > 0 {
			return false;
		}
		if let Some(worker) = map.remove(key) {
			worker.close();
			tracing::debug!(worker = %worker.id(), generation, "executor.worker.evict");
		}
		true
	}

	pub fn snapshot(&self) -> BTreeMap<WorkerId, JobCounters> {
		let entry = |worker: &WorkerHandle<T>| (worker.id().clone(), worker.snapshot());
		match &self.routes {
			Routes::Elastic(map) => map.values().map(entry).collect(),
			Routes::Sharded(shards) => shards.iter().map(entry).collect(),
		}
	}

	/// Marks the table stopped and hands back every worker.
	pub fn take_all(&mut self) -> Vec<WorkerHandle<T>> {
		self.stopped = true;
		match &mut self.routes {
			Routes::Elastic(map) => map.drain().map(|(_, worker)| worker).collect(),
			Routes::Sharded(shards) => std::mem::take(shards),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn worker_ids_display_key_or_shard() {
		assert_eq!(WorkerId::Key(Arc::from("orders/17")).to_string(), "orders/17");
		assert_eq!(WorkerId::Shard(3).to_string(), "shard-3");
	}

	#[test]
	fn info_lookups_by_key_and_shard() {
		let busy = JobCounters {
			submitted: 3,
			completed: 1,
			..JobCounters::default()
		};
		let mut workers = BTreeMap::new();
		workers.insert(WorkerId::Key(Arc::from("a")), busy);
		workers.insert(WorkerId::Shard(0), JobCounters::default());
		let info = ExecutorInfo::new(workers, busy);

		assert_eq!(info.len(), 2);
		assert_eq!(info.key("a"), Some(&busy));
		assert_eq!(info.key("b"), None);
		assert_eq!(info.shard(0), Some(&JobCounters::default()));
		assert_eq!(info.totals().pending(), 2);
		// Keys sort before shards.
		let order: Vec<String> = info.workers().map(|(id, _)| id.to_string()).collect();
		assert_eq!(order, vec!["a", "shard-0"]);
	}
}
