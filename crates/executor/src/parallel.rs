//! Bounded parallel loops over an index range.
//!
//! Independent of the executor: partitions run on scoped OS threads, so the
//! loop body may borrow from the caller's stack.

use std::panic;
use std::thread;

use parking_lot::Mutex;

use crate::TaskClass;
use crate::spawn::spawn_scoped;

/// Calls `f(i, lock)` once for every `i` in `0..n`, on at most `limit`
/// threads, and returns after every call has finished.
///
/// `lock` is one mutex shared by all calls, for guarding state the body
/// captures. `limit` is clamped to `1..=n`; `n == 0` returns immediately.
/// Partition `p` handles `p, p + limit, p + 2 * limit, ...`.
///
/// A panic in `f` is re-raised on the calling thread after every partition
/// has been joined.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let sum = AtomicUsize::new(0);
/// keyed_executor::for_each_bounded(5, 3, |i, _| {
///     sum.fetch_add(i, Ordering::Relaxed);
/// });
/// assert_eq!(sum.into_inner(), 10);
/// ```
pub fn for_each_bounded<F>(n: usize, limit: usize, f: F)
where
	F: Fn(usize, &Mutex<()>) + Sync,
{
	for_each_bounded_with(n, limit, (), f);
}

/// Like [`for_each_bounded`], with the shared lock guarding `state`, which
/// is handed back once every call has finished.
///
/// ```
/// let squares = keyed_executor::for_each_bounded_with(4, 2, Vec::new(), |i, out| {
///     out.lock().push(i * i);
/// });
/// let mut squares = squares;
/// squares.sort_unstable();
/// assert_eq!(squares, vec![0, 1, 4, 9]);
/// ```
pub fn for_each_bounded_with<S, F>(n: usize, limit: usize, state: S, f: F) -> S
where
	S: Send,
	F: Fn(usize, &Mutex<S>) + Sync,
{
	let state = Mutex::new(state);
	if n == 0 {
		return state.into_inner();
	}

	let partitions = limit.clamp(1, n);
	let run = |partition: usize| {
		for index in (partition..n).step_by(partitions) {
			f(index, &state);
		}
	};

	thread::scope(|scope| {
		let mut handles = Vec::with_capacity(partitions);
		for partition in 0..partitions {
			match spawn_scoped(TaskClass::Partition, format!("parallel-{partition}"), scope, move || run(partition)) {
				Ok(handle) => handles.push(handle),
				Err(err) => {
					tracing::warn!(partition, error = %err, "parallel.spawn_failed");
					run(partition);
				}
			}
		}

		let mut panicked = None;
		for handle in handles {
			if let Err(payload) = handle.join() {
				panicked.get_or_insert(payload);
			}
		}
		if let Some(payload) = panicked {
			panic::resume_unwind(payload);
		}
	});

	state.into_inner()
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use proptest::prelude::*;

	use super::*;

	fn visits(n: usize, limit: usize) -> Vec<usize> {
		let mut seen = for_each_bounded_with(n, limit, Vec::new(), |i, seen| seen.lock().push(i));
		seen.sort_unstable();
		seen
	}

	#[test]
	fn covers_every_index_once() {
		assert_eq!(visits(5, 3), vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn zero_items_never_calls_body() {
		let calls = AtomicUsize::new(0);
		for_each_bounded(0, 4, |_, _| {
			calls.fetch_add(1, Ordering::SeqCst);
		});
		assert_eq!(calls.into_inner(), 0);
	}

	#[test]
	fn limit_is_clamped_to_item_count() {
		let threads = for_each_bounded_with(5, 10, HashSet::new(), |_, seen| {
			seen.lock().insert(thread::current().id());
		});
		assert!(threads.len() <= 5);
		assert_eq!(visits(5, 10), vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn zero_limit_runs_on_one_partition() {
		let names = for_each_bounded_with(3, 0, HashSet::new(), |_, seen| {
			seen.lock().insert(thread::current().name().map(str::to_owned));
		});
		assert_eq!(names.len(), 1);
		assert_eq!(visits(3, 0), vec![0, 1, 2]);
	}

	#[test]
	fn partitions_take_strided_indices() {
		let by_thread = for_each_bounded_with(7, 3, Vec::new(), |i, seen| {
			let name = thread::current().name().unwrap_or_default().to_owned();
			seen.lock().push((name, i));
		});
		for (name, index) in by_thread {
			assert_eq!(name, format!("parallel-{}", index % 3));
		}
	}

	#[test]
	#[should_panic(expected = "index 2")]
	fn body_panic_reaches_caller() {
		for_each_bounded(4, 2, |i, _| {
			if i == 2 {
				panic!("index 2");
			}
		});
	}

	proptest! {
		#[test]
		fn every_index_visited_exactly_once(n in 0usize..200, limit in 0usize..16) {
			let expected: Vec<usize> = (0..n).collect();
			prop_assert_eq!(visits(n, limit), expected);
		}
	}
}
