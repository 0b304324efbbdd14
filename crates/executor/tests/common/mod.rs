use std::future::Future;
use std::time::Duration;

/// Routes executor events to the test writer. Safe to call from every test.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();
}

/// Awaits `fut`, failing the test if it takes longer than two seconds.
pub async fn within<F: Future>(fut: F) -> F::Output {
	tokio::time::timeout(Duration::from_secs(2), fut).await.expect("timed out")
}
