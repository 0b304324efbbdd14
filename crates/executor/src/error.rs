//! Error types for executor construction and job submission.

use thiserror::Error;

/// Errors detected while validating an [`ExecutorConfig`](crate::ExecutorConfig).
///
/// These are fatal: the executor is never built from an invalid config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
	/// Mailbox capacity is below the supported minimum.
	#[error("mailbox capacity {capacity} is below the minimum of {minimum}")]
	MailboxCapacityTooSmall {
		/// The rejected capacity.
		capacity: usize,
		/// The smallest accepted capacity.
		minimum: usize,
	},

	/// Elastic routing was configured with a zero idle timeout.
	#[error("idle timeout must be greater than zero")]
	ZeroIdleTimeout,

	/// Fixed-shard routing was configured with no workers.
	#[error("fixed-shard routing needs at least one worker")]
	ZeroShardCount,
}

/// Errors returned when a job cannot be handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
	/// The executor was stopped before or while the job was being handed off.
	#[error("executor is stopped")]
	Stopped,

	/// The target mailbox is at capacity (non-blocking submit only).
	#[error("worker mailbox is full")]
	Full,
}

/// Result type for executor construction.
pub type Result<T> = std::result::Result<T, ConfigError>;
