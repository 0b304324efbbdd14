use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MailboxSendError {
	/// Mailbox is closed.
	Closed,
	/// Mailbox is at capacity and non-blocking send was used.
	Full,
}

struct MailboxState<T> {
	queue: VecDeque<T>,
	/// Messages handed to the receiver and not yet acknowledged.
	in_hand: usize,
	closed: bool,
}

impl<T> MailboxState<T> {
	fn held(&self) -> usize {
		self.queue.len() + self.in_hand
	}
}

struct MailboxInner<T> {
	capacity: usize,
	state: Mutex<MailboxState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
}

/// Multi-producer mailbox sender.
pub(crate) struct MailboxSender<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Single-consumer mailbox receiver.
pub(crate) struct MailboxReceiver<T> {
	inner: Arc<MailboxInner<T>>,
}

/// Bounded FIFO mailbox private to one worker.
///
/// Capacity counts queued messages plus messages received but not yet
/// acknowledged, so a worker stuck inside a handler still holds its slot.
/// Senders wait for capacity instead of dropping.
pub(crate) struct Mailbox<T> {
	inner: Arc<MailboxInner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Mailbox<T> {
	/// Creates a bounded mailbox.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		Self {
			inner: Arc::new(MailboxInner {
				capacity,
				state: Mutex::new(MailboxState {
					queue: VecDeque::with_capacity(capacity),
					in_hand: 0,
					closed: false,
				}),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		}
	}

	/// Splits the mailbox into its sender and receiver halves.
	pub fn split(self) -> (MailboxSender<T>, MailboxReceiver<T>) {
		let tx = MailboxSender {
			inner: Arc::clone(&self.inner),
		};
		(tx, MailboxReceiver { inner: self.inner })
	}
}

impl<T> MailboxInner<T> {
	fn close(&self) {
		self.state.lock().closed = true;
		self.notify_recv.notify_waiters();
		self.notify_send.notify_waiters();
	}
}

impl<T> MailboxSender<T> {
	/// Closes the mailbox. The receiver drains existing messages then sees `None`.
	pub fn close(&self) {
		self.inner.close();
	}

	/// Non-blocking enqueue.
	pub fn try_send(&self, msg: T) -> Result<(), MailboxSendError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(MailboxSendError::Closed);
		}
		if state.held() >= self.inner.capacity {
			return Err(MailboxSendError::Full);
		}
		state.queue.push_back(msg);
		drop(state);
		self.inner.notify_recv.notify_one();
		Ok(())
	}

	/// Enqueues, waiting for capacity when the mailbox is full.
	pub async fn send(&self, msg: T) -> Result<(), MailboxSendError> {
		loop {
			// Register before checking capacity so an ack between the check
			// and the await is not lost.
			let notified = self.inner.notify_send.notified();
			{
				let mut state = self.inner.state.lock();
				if state.closed {
					return Err(MailboxSendError::Closed);
				}
				if state.held() < self.inner.capacity {
					state.queue.push_back(msg);
					drop(state);
					self.inner.notify_recv.notify_one();
					return Ok(());
				}
			}
			notified.await;
		}
	}

	/// Returns queued plus in-hand message count.
	#[cfg(test)]
	pub fn held(&self) -> usize {
		self.inner.state.lock().held()
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one message. Returns `None` once the mailbox is closed and drained.
	///
	/// The returned message keeps its capacity slot until [`Self::ack`].
	pub async fn recv(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();
			{
				let mut state = self.inner.state.lock();
				if let Some(msg) = state.queue.pop_front() {
					state.in_hand += 1;
					return Some(msg);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Releases the capacity slot of one received message.
	pub fn ack(&self) {
		let mut state = self.inner.state.lock();
		state.in_hand = state.in_hand.saturating_sub(1);
		drop(state);
		self.inner.notify_send.notify_waiters();
	}

	/// Closes the mailbox and takes every queued message.
	pub fn close_and_drain(&self) -> Vec<T> {
		let drained: Vec<T> = {
			let mut state = self.inner.state.lock();
			state.closed = true;
			state.queue.drain(..).collect()
		};
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_send.notify_waiters();
		drained
	}

	/// Returns number of queued messages, excluding in-hand ones.
	pub fn queued(&self) -> usize {
		self.inner.state.lock().queue.len()
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn try_send_returns_full_when_at_capacity() {
		let (tx, rx) = Mailbox::new(3).split();

		assert_eq!(tx.try_send(1u32), Ok(()));
		assert_eq!(tx.try_send(2), Ok(()));
		assert_eq!(tx.try_send(3), Ok(()));
		assert_eq!(tx.try_send(4), Err(MailboxSendError::Full));

		tx.close();
		assert_eq!(rx.recv().await, Some(1));
		assert_eq!(rx.recv().await, Some(2));
		assert_eq!(rx.recv().await, Some(3));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn in_hand_message_keeps_its_slot_until_ack() {
		let (tx, rx) = Mailbox::new(2).split();

		assert_eq!(tx.try_send(1u32), Ok(()));
		assert_eq!(tx.try_send(2), Ok(()));
		assert_eq!(rx.recv().await, Some(1));
		// Received but unacknowledged: still full.
		assert_eq!(tx.held(), 2);
		assert_eq!(rx.queued(), 1);
		assert_eq!(tx.try_send(3), Err(MailboxSendError::Full));

		rx.ack();
		assert_eq!(tx.held(), 1);
		assert_eq!(tx.try_send(3), Ok(()));
	}

	#[tokio::test]
	async fn send_blocks_until_ack_frees_capacity() {
		let (tx, rx) = Mailbox::new(2).split();

		tx.send(1u32).await.unwrap();
		tx.send(2).await.unwrap();

		let tx2 = tx.clone();
		let send_task = tokio::spawn(async move { tx2.send(3).await });

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(rx.recv().await, Some(1));
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(!send_task.is_finished(), "recv alone must not free the slot");

		rx.ack();
		let result = tokio::time::timeout(Duration::from_millis(200), send_task)
			.await
			.expect("send should unblock after ack")
			.unwrap();
		assert_eq!(result, Ok(()));

		tx.close();
		assert_eq!(rx.recv().await, Some(2));
		assert_eq!(rx.recv().await, Some(3));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn send_on_closed_mailbox_returns_closed() {
		let (tx, _rx) = Mailbox::new(4).split();
		tx.close();

		assert_eq!(tx.send(1u32).await, Err(MailboxSendError::Closed));
		assert_eq!(tx.try_send(2), Err(MailboxSendError::Closed));
	}

	#[tokio::test]
	async fn blocked_send_wakes_with_closed_on_close() {
		let (tx, _rx) = Mailbox::new(1).split();
		tx.send(1u32).await.unwrap();

		let tx2 = tx.clone();
		let send_task = tokio::spawn(async move { tx2.send(2).await });
		tokio::time::sleep(Duration::from_millis(10)).await;

		tx.close();
		let result = tokio::time::timeout(Duration::from_millis(200), send_task)
			.await
			.expect("blocked send should wake on close")
			.unwrap();
		assert_eq!(result, Err(MailboxSendError::Closed));
	}

	#[tokio::test]
	async fn empty_mailbox_recv_blocks_until_send() {
		let (tx, rx) = Mailbox::new(4).split();

		let pending = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
		assert!(pending.is_err(), "recv on empty should block");

		tx.send(42u32).await.unwrap();
		assert_eq!(rx.recv().await, Some(42));
	}

	#[tokio::test]
	async fn close_and_drain_returns_queued_in_order() {
		let (tx, rx) = Mailbox::new(4).split();
		tx.send(1u32).await.unwrap();
		tx.send(2).await.unwrap();
		tx.send(3).await.unwrap();
		assert_eq!(rx.recv().await, Some(1));

		assert_eq!(rx.close_and_drain(), vec![2, 3]);
		assert_eq!(rx.recv().await, None);
		assert_eq!(tx.send(4).await, Err(MailboxSendError::Closed));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn multi_sender_never_drops() {
		const SENDERS: usize = 8;
		const ITEMS_PER_SENDER: usize = 200;
		let total = SENDERS * ITEMS_PER_SENDER;

		let (tx, rx) = Mailbox::new(2).split();
		let barrier = Arc::new(tokio::sync::Barrier::new(SENDERS));

		let mut handles = Vec::new();
		for sender_id in 0..SENDERS {
			let tx = tx.clone();
			let barrier = Arc::clone(&barrier);
			handles.push(tokio::spawn(async move {
				barrier.wait().await;
				for seq in 0..ITEMS_PER_SENDER {
					let val = (sender_id * ITEMS_PER_SENDER + seq) as u32;
					assert_eq!(tx.send(val).await, Ok(()), "sender {sender_id} seq {seq}: must not drop");
				}
			}));
		}

		let receiver = tokio::spawn(async move {
			let mut received = Vec::with_capacity(total);
			for _ in 0..total {
				let val = rx.recv().await.expect("should not close early");
				rx.ack();
				received.push(val);
			}
			received
		});

		for h in handles {
			h.await.unwrap();
		}
		tx.close();

		let received = receiver.await.unwrap();
		assert_eq!(received.len(), total);

		// Each sender's own items arrive in the order it sent them.
		for sender_id in 0..SENDERS {
			let lo = (sender_id * ITEMS_PER_SENDER) as u32;
			let hi = lo + ITEMS_PER_SENDER as u32;
			let mine: Vec<u32> = received.iter().copied().filter(|v| (lo..hi).contains(v)).collect();
			let expected: Vec<u32> = (lo..hi).collect();
			assert_eq!(mine, expected, "sender {sender_id} order");
		}
	}
}
