//! Completion groups over one shared executor.
//!
//! A [`GroupManager`] owns a single [`Executor`] whose handler demultiplexes
//! each job to the [`Group`] it was added through. Every group tracks its
//! in-flight jobs with a [`CountdownLatch`]; [`Group::wait`] returns once that
//! count has drained to zero and then deregisters the group.
//!
//! Each job carries a ticket holding its group's state, and dispatch goes
//! through that ticket. The id-keyed group table takes no part in dispatch;
//! it only records which groups are still registered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ExecutorConfig;
use crate::error::{Result, SubmitError};
use crate::executor::Executor;
use crate::handler::JobHandler;
use crate::latch::CountdownLatch;
use crate::registry::ExecutorInfo;

/// Creates groups that share one executor.
pub struct GroupManager<T>
where
	T: Send + 'static,
{
	executor: Executor<GroupJob<T>>,
	table: Arc<GroupTable<T>>,
}

impl<T> Clone for GroupManager<T>
where
	T: Send + 'static,
{
	fn clone(&self) -> Self {
		Self {
			executor: self.executor.clone(),
			table: Arc::clone(&self.table),
		}
	}
}

impl<T> GroupManager<T>
where
	T: Send + 'static,
{
	/// Builds the shared executor from `config`.
	pub fn new(config: ExecutorConfig) -> Result<Self> {
		let table = Arc::new(GroupTable::default());
		let executor = Executor::new(config, Dispatch)?;
		Ok(Self { executor, table })
	}

	/// Registers a new group whose jobs run `handler`.
	pub fn new_group(&self, handler: impl JobHandler<T>) -> Group<T> {
		let state = self.table.register(Arc::new(handler));
		tracing::debug!(group = state.id, "group.create");
		Group {
			state,
			manager: self.clone(),
		}
	}

	/// Number of groups not yet waited on or fully drained after a drop.
	pub fn active_groups(&self) -> usize {
		self.table.groups.lock().len()
	}

	/// Counters of the shared executor.
	pub fn info(&self) -> ExecutorInfo {
		self.executor.info()
	}

	/// Waits until the shared executor has nothing outstanding, across all groups.
	pub async fn wait(&self) {
		self.executor.wait().await;
	}

	/// Stops the shared executor.
	///
	/// Jobs discarded by the stop count as finished for their group, so
	/// pending [`Group::wait`] calls return.
	pub async fn stop(&self) {
		self.executor.stop().await;
	}
}

/// A cohort of jobs that can be waited on together.
///
/// [`Group::wait`] consumes the handle, so no job can be added to a group once
/// it is being waited on. Dropping a group without waiting leaves its jobs
/// running; it is deregistered when the last one finishes.
pub struct Group<T>
where
	T: Send + 'static,
{
	state: Arc<GroupState<T>>,
	manager: GroupManager<T>,
}

impl<T> Group<T>
where
	T: Send + 'static,
{
	/// Group id, unique within its manager.
	pub fn id(&self) -> u64 {
		self.state.id
	}

	/// Jobs added and not yet finished.
	pub fn in_flight(&self) -> usize {
		self.state.latch.count()
	}

	/// Submits `payload` under `key` as part of this group.
	///
	/// Suspends while the key's mailbox is full. A job that is rejected or
	/// later discarded by a stop no longer counts toward the group.
	pub async fn add(&self, key: impl Into<Arc<str>>, payload: T) -> std::result::Result<(), SubmitError> {
		self.state.latch.increment();
		let job = GroupJob {
			payload,
			ticket: Ticket {
				state: Arc::clone(&self.state),
				table: Arc::clone(&self.manager.table),
			},
		};
		self.manager.executor.submit(key, job).await
	}

	/// Waits until every job added to this group has finished, then
	/// deregisters the group.
	pub async fn wait(self) {
		self.state.latch.wait().await;
		self.manager.table.remove(self.state.id);
		tracing::debug!(group = self.state.id, "group.release");
	}
}

impl<T> Drop for Group<T>
where
	T: Send + 'static,
{
	fn drop(&mut self) {
		self.state.detached.store(true, Ordering::SeqCst);
		if self.state.latch.count() == 0 {
			self.manager.table.remove(self.state.id);
		}
	}
}

struct GroupState<T>
where
	T: Send + 'static,
{
	id: u64,
	handler: Arc<dyn JobHandler<T>>,
	latch: CountdownLatch,
	detached: AtomicBool,
}

struct GroupTable<T>
where
	T: Send + 'static,
{
	groups: Mutex<HashMap<u64, Arc<GroupState<T>>>>,
	next_id: AtomicU64,
}

impl<T> Default for GroupTable<T>
where
	T: Send + 'static,
{
	fn default() -> Self {
		Self {
			groups: Mutex::new(HashMap::new()),
			next_id: AtomicU64::new(1),
		}
	}
}

impl<T> GroupTable<T>
where
	T: Send + 'static,
{
	fn register(&self, handler: Arc<dyn JobHandler<T>>) -> Arc<GroupState<T>> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let state = Arc::new(GroupState {
			id,
			handler,
			latch: CountdownLatch::new(),
			detached: AtomicBool::new(false),
		});
		self.groups.lock().insert(id, Arc::clone(&state));
		state
	}

	fn remove(&self, id: u64) {
		self.groups.lock().remove(&id);
	}
}

/// Executor payload: the caller's payload tagged with its group.
struct GroupJob<T>
where
	T: Send + 'static,
{
	payload: T,
	ticket: Ticket<T>,
}

/// One in-flight slot of a group, released on drop.
///
/// Dropping covers every way a job can end: handled, panicked, rejected by a
/// stopped executor or discarded from a mailbox.
struct Ticket<T>
where
	T: Send + 'static,
{
	state: Arc<GroupState<T>>,
	table: Arc<GroupTable<T>>,
}

impl<T> Drop for Ticket<T>
where
	T: Send + 'static,
{
	fn drop(&mut self) {
		if self.state.latch.decrement() == 0 && self.state.detached.load(Ordering::SeqCst) {
			self.table.remove(self.state.id);
			tracing::debug!(group = self.state.id, "group.release");
		}
	}
}

/// The shared executor's handler: runs each job through its group's handler.
struct Dispatch;

#[async_trait]
impl<T> JobHandler<GroupJob<T>> for Dispatch
where
	T: Send + 'static,
{
	async fn handle(&self, key: &str, job: GroupJob<T>) -> anyhow::Result<()> {
		let GroupJob { payload, ticket } = job;
		let result = ticket.state.handler.handle(key, payload).await;
		drop(ticket);
		result
	}
}
