//! Executor configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{ConfigError, Result};

/// Default per-worker mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 20;

/// Smallest accepted mailbox capacity.
pub const MIN_MAILBOX_CAPACITY: usize = 2;

/// Default idle period after which an elastic worker evicts itself.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// How submissions are mapped onto workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RoutingPolicy {
	/// One worker per recently active key, created on first submit and
	/// evicted after the idle timeout.
	#[default]
	Elastic,
	/// A constant pool of `workers` workers; a key is routed by a stable hash.
	/// Workers are never evicted.
	FixedShard {
		/// Pool size.
		workers: usize,
	},
}

/// Executor construction parameters.
///
/// Built with the chained setters below or deserialized from a host config
/// file, then checked by [`ExecutorConfig::validate`] when the executor is
/// constructed.
///
/// ```toml
/// mailbox_capacity = 8
/// idle_timeout_ms = 500
///
/// [routing]
/// policy = "fixed_shard"
/// workers = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
	pub(crate) mailbox_capacity: usize,
	#[serde(rename = "idle_timeout_ms", deserialize_with = "duration_from_millis")]
	pub(crate) idle_timeout: Duration,
	pub(crate) routing: RoutingPolicy,
}

impl Default for ExecutorConfig {
	fn default() -> Self {
		Self {
			mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
			idle_timeout: DEFAULT_IDLE_TIMEOUT,
			routing: RoutingPolicy::Elastic,
		}
	}
}

impl ExecutorConfig {
	/// Config for an elastic per-key pool with default limits.
	pub fn elastic() -> Self {
		Self::default()
	}

	/// Config for a fixed pool of `workers` hash-routed workers.
	pub fn fixed_shard(workers: usize) -> Self {
		Self::default().routing(RoutingPolicy::FixedShard { workers })
	}

	/// Sets the per-worker mailbox capacity (queued plus in-progress jobs).
	#[must_use]
	pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
		self.mailbox_capacity = capacity;
		self
	}

	/// Sets the idle period after which an elastic worker evicts itself.
	#[must_use]
	pub fn idle_timeout(mut self, timeout: Duration) -> Self {
		self.idle_timeout = timeout;
		self
	}

	/// Sets the routing policy.
	#[must_use]
	pub fn routing(mut self, routing: RoutingPolicy) -> Self {
		self.routing = routing;
		self
	}

	/// Returns the configured routing policy.
	pub fn routing_policy(&self) -> RoutingPolicy {
		self.routing
	}

	/// Checks every limit. Called by executor constructors.
	pub fn validate(&self) -> Result<()> {
		if self.mailbox_capacity < MIN_MAILBOX_CAPACITY {
			return Err(ConfigError::MailboxCapacityTooSmall {
				capacity: self.mailbox_capacity,
				minimum: MIN_MAILBOX_CAPACITY,
			});
		}
		match self.routing {
			RoutingPolicy::Elastic if self.idle_timeout.is_zero() => Err(ConfigError::ZeroIdleTimeout),
			RoutingPolicy::FixedShard { workers: 0 } => Err(ConfigError::ZeroShardCount),
			_ => Ok(()),
		}
	}
}

fn duration_from_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
	D: Deserializer<'de>,
{
	u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_valid() {
		let config = ExecutorConfig::default();
		assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
		assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
		assert_eq!(config.routing_policy(), RoutingPolicy::Elastic);
		assert_eq!(config.validate(), Ok(()));
	}

	#[test]
	fn capacity_below_two_is_rejected() {
		for capacity in [0, 1] {
			let err = ExecutorConfig::default().mailbox_capacity(capacity).validate().unwrap_err();
			assert_eq!(
				err,
				ConfigError::MailboxCapacityTooSmall {
					capacity,
					minimum: MIN_MAILBOX_CAPACITY
				}
			);
		}
		assert_eq!(ExecutorConfig::default().mailbox_capacity(2).validate(), Ok(()));
	}

	#[test]
	fn zero_idle_timeout_only_matters_for_elastic() {
		let elastic = ExecutorConfig::elastic().idle_timeout(Duration::ZERO);
		assert_eq!(elastic.validate(), Err(ConfigError::ZeroIdleTimeout));

		let fixed = ExecutorConfig::fixed_shard(3).idle_timeout(Duration::ZERO);
		assert_eq!(fixed.validate(), Ok(()));
	}

	#[test]
	fn empty_shard_pool_is_rejected() {
		assert_eq!(ExecutorConfig::fixed_shard(0).validate(), Err(ConfigError::ZeroShardCount));
	}

	#[test]
	fn parses_toml_with_fixed_shard_routing() {
		let config: ExecutorConfig = toml::from_str(
			r#"
			mailbox_capacity = 8
			idle_timeout_ms = 250

			[routing]
			policy = "fixed_shard"
			workers = 4
			"#,
		)
		.unwrap();

		assert_eq!(
			config,
			ExecutorConfig::fixed_shard(4).mailbox_capacity(8).idle_timeout(Duration::from_millis(250))
		);
	}

	#[test]
	fn missing_fields_fall_back_to_defaults() {
		let config: ExecutorConfig = serde_json::from_str(r#"{ "mailbox_capacity": 5 }"#).unwrap();
		assert_eq!(config, ExecutorConfig::default().mailbox_capacity(5));
	}

	#[test]
	fn parsed_config_still_validates() {
		let config: ExecutorConfig = serde_json::from_str(r#"{ "mailbox_capacity": 1 }"#).unwrap();
		assert!(matches!(config.validate(), Err(ConfigError::MailboxCapacityTooSmall { capacity: 1, .. })));
	}

	#[test]
	fn unknown_fields_are_rejected() {
		let parsed = serde_json::from_str::<ExecutorConfig>(r#"{ "max_workers": 5 }"#);
		assert!(parsed.is_err());
	}
}
