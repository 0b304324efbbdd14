/// Execution classes used to tag spawned tasks for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Long-lived per-key or per-shard worker loop.
	Worker,
	/// One handler invocation, isolated so a panic stays observable.
	Job,
	/// One stride of a bounded parallel loop, run on a dedicated OS thread.
	Partition,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Worker => "worker",
			Self::Job => "job",
			Self::Partition => "partition",
		}
	}
}
