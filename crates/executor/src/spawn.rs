use std::future::Future;
use std::io;
use std::sync::OnceLock;
use std::thread::{self, Scope, ScopedJoinHandle};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::TaskClass;

/// Returns the handle of the entered runtime, or of a lazily built fallback.
///
/// The fallback lets an executor be constructed from plain synchronous code
/// (fixed-shard workers are spawned eagerly at construction).
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("keyed-executor-global")
			.build()
			.expect("failed to build keyed-executor global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with a task class.
#[allow(clippy::disallowed_methods)]
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "executor.spawn");
	runtime_handle().spawn(fut)
}

/// Spawns a task tracked by `tracker` so shutdown can wait for it.
pub(crate) fn spawn_tracked<F>(class: TaskClass, tracker: &TaskTracker, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), tracked = tracker.len(), "executor.spawn_tracked");
	tracker.spawn_on(fut, &runtime_handle())
}

/// Spawns a named OS thread inside `scope`, tagged with a task class.
pub(crate) fn spawn_scoped<'scope, 'env, F, T>(class: TaskClass, name: String, scope: &'scope Scope<'scope, 'env>, f: F) -> io::Result<ScopedJoinHandle<'scope, T>>
where
	F: FnOnce() -> T + Send + 'scope,
	T: Send + 'scope,
{
	tracing::trace!(task_class = class.as_str(), thread = %name, "executor.spawn_scoped");
	thread::Builder::new().name(name).spawn_scoped(scope, f)
}
