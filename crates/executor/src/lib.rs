#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Keyed job executor.
//!
//! Jobs submitted under the same key run one at a time in submission order;
//! jobs under different keys run concurrently.
//!
//! # Main Types
//!
//! - [`Executor`] - Routes jobs to per-key (or per-shard) workers with bounded mailboxes
//! - [`ExecutorConfig`] - Mailbox capacity, idle timeout and routing policy
//! - [`JobHandler`] - The user callback, usually built with [`handler_fn`]
//! - [`GroupManager`] / [`Group`] - Completion barriers over a shared executor
//! - [`for_each_bounded`] - Bounded parallel loop over an index range
//!
//! # Worker lifecycle
//!
//! With [`RoutingPolicy::Elastic`] a worker is created on the first submit for
//! its key and retires itself after [`ExecutorConfig::idle_timeout`] without
//! work. Retirement is re-checked under the registry lock, so a job reserved
//! for the key in the meantime keeps the worker alive. A later submit for a
//! retired key starts a fresh worker with fresh counters.
//!
//! With [`RoutingPolicy::FixedShard`] a constant pool of workers is started up
//! front and keys are spread over it by [`shard_for`].
//!
//! ```
//! use keyed_executor::{Executor, ExecutorConfig, handler_fn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = Executor::new(
//!     ExecutorConfig::elastic(),
//!     handler_fn(|key: String, n: u32| async move {
//!         tracing::info!(%key, n, "job");
//!     }),
//! )?;
//!
//! executor.submit("orders/17", 1).await?;
//! executor.submit("orders/17", 2).await?;
//! executor.wait().await;
//! assert_eq!(executor.info().key("orders/17").map(|c| c.completed), Some(2));
//! executor.stop().await;
//! # Ok(())
//! # }
//! ```

/// Task classes for tagging spawned work.
mod class;
/// Executor configuration and defaults.
pub mod config;
/// Configuration and submission errors.
pub mod error;
/// The keyed executor.
mod executor;
/// Completion groups over a shared executor.
mod group;
/// Job handler trait and closure adapter.
mod handler;
/// Countdown latch used by groups.
mod latch;
/// Bounded per-worker mailbox.
mod mailbox;
/// Bounded parallel loops.
mod parallel;
/// Worker routing table.
mod registry;
/// Stable key hashing for fixed-shard routing.
mod route;
/// Runtime entry points for tasks and threads.
mod spawn;
/// Job counters.
mod stats;
/// Worker generations and stop tokens.
mod token;
/// Worker loop.
mod worker;

pub use class::TaskClass;
pub use config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAILBOX_CAPACITY, ExecutorConfig, MIN_MAILBOX_CAPACITY, RoutingPolicy};
pub use error::{ConfigError, SubmitError};
pub use executor::Executor;
pub use group::{Group, GroupManager};
pub use handler::{HandlerFn, IntoJobResult, JobHandler, handler_fn};
pub use latch::CountdownLatch;
pub use parallel::{for_each_bounded, for_each_bounded_with};
pub use registry::{ExecutorInfo, WorkerId};
pub use route::{shard_for, stable_hash};
pub use spawn::spawn;
pub use stats::JobCounters;
