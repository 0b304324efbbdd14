//! Stable key-to-shard routing for fixed-shard executors.

use std::hash::Hasher;

use rustc_hash::FxHasher;

/// Hashes `key` with a seedless hasher, so the value is stable for the life
/// of the process (and across runs of the same build).
pub fn stable_hash(key: &str) -> u64 {
	let mut hasher = FxHasher::default();
	hasher.write(key.as_bytes());
	hasher.finish()
}

/// Maps `key` onto one of `shards` workers.
///
/// # Panics
///
/// Panics if `shards` is zero; executor config validation rules that out.
pub fn shard_for(key: &str, shards: usize) -> usize {
	assert!(shards > 0, "shard count must be > 0");
	(stable_hash(key) % shards as u64) as usize
}
