use parking_lot::Mutex;
use tokio::sync::Notify;

/// Counter that can be raised and lowered, with waiters released at zero.
///
/// Unlike a one-shot countdown, the count may return to a positive value after
/// reaching zero; each wait observes the count at the time it checks.
#[derive(Debug, Default)]
pub struct CountdownLatch {
	count: Mutex<usize>,
	zero: Notify,
}

impl CountdownLatch {
	/// Creates a latch at zero.
	pub fn new() -> Self {
		Self::default()
	}

	/// Raises the count by one.
	pub fn increment(&self) {
		*self.count.lock() += 1;
	}

	/// Lowers the count by one and returns the remaining count.
	///
	/// # Panics
	///
	/// Panics when the count is already zero.
	pub fn decrement(&self) -> usize {
		let remaining = {
			let mut count = self.count.lock();
			assert!(*count > 0, "CountdownLatch decremented below zero");
			*count -= 1;
			*count
		};
		if remaining == 0 {
			self.zero.notify_waiters();
		}
		remaining
	}

	/// Current count.
	pub fn count(&self) -> usize {
		*self.count.lock()
	}

	/// Waits until the count is zero.
	pub async fn wait(&self) {
		loop {
			let notified = self.zero.notified();
			if self.count() == 0 {
				return;
			}
			notified.await;
		}
	}
}
