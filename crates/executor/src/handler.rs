//! User job handlers.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

/// Processes one job for a key.
///
/// A handler error is logged and counted by the executor; it never reaches
/// the submitter and never stops the worker. The job is finished either way.
#[async_trait]
pub trait JobHandler<T>: Send + Sync + 'static
where
	T: Send + 'static,
{
	/// Handles `payload` submitted under `key`.
	async fn handle(&self, key: &str, payload: T) -> anyhow::Result<()>;
}

/// Normalizes handler return values to `anyhow::Result<()>`.
///
/// Implemented for `()` and for `Result<(), E>` so closures may be written
/// with or without an error return.
pub trait IntoJobResult {
	/// Performs the conversion.
	fn into_job_result(self) -> anyhow::Result<()>;
}

impl IntoJobResult for () {
	fn into_job_result(self) -> anyhow::Result<()> {
		Ok(())
	}
}

impl<E> IntoJobResult for Result<(), E>
where
	E: Into<anyhow::Error>,
{
	fn into_job_result(self) -> anyhow::Result<()> {
		self.map_err(Into::into)
	}
}

/// Closure-backed [`JobHandler`]. Built by [`handler_fn`].
pub struct HandlerFn<F, T> {
	f: F,
	_payload: PhantomData<fn(T)>,
}

impl<F, T> fmt::Debug for HandlerFn<F, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandlerFn").finish_non_exhaustive()
	}
}

/// Wraps an async closure `Fn(String, T) -> Future` as a [`JobHandler`].
///
/// ```
/// use keyed_executor::handler_fn;
///
/// let handler = handler_fn(|key: String, n: u32| async move {
///     tracing::info!(%key, n, "handled");
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut, T>(f: F) -> HandlerFn<F, T>
where
	F: Fn(String, T) -> Fut + Send + Sync + 'static,
	Fut: Future + Send + 'static,
	Fut::Output: IntoJobResult,
	T: Send + 'static,
{
	HandlerFn { f, _payload: PhantomData }
}

#[async_trait]
impl<F, Fut, T> JobHandler<T> for HandlerFn<F, T>
where
	F: Fn(String, T) -> Fut + Send + Sync + 'static,
	Fut: Future + Send + 'static,
	Fut::Output: IntoJobResult,
	T: Send + 'static,
{
	async fn handle(&self, key: &str, payload: T) -> anyhow::Result<()> {
		(self.f)(key.to_owned(), payload).await.into_job_result()
	}
}
