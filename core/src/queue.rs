use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
	/// membership traffic: accept, reject, follow-back, undo-back, actor updates
	Registor,
	/// fan-out of subscriber activities
	Relay,
}

impl std::fmt::Display for JobKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			JobKind::Registor => write!(f, "registor"),
			JobKind::Relay => write!(f, "relay"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
	pub kind: JobKind,
	pub inbox: String,
	pub payload: String,
	/// deliveries attempted so far
	pub attempt: u32,
	/// further attempts allowed after the first one
	pub retry: u32,
}

impl Job {
	pub fn new(kind: JobKind, inbox: String, payload: String, retry: u32) -> Self {
		Job { kind, inbox, payload, attempt: 0, retry }
	}

	pub fn domain(&self) -> String {
		crate::ext::domain_of(&self.inbox)
	}

	/// same job for its next attempt, if budget allows
	pub fn repeat(self) -> Option<Self> {
		if self.attempt >= self.retry {
			return None;
		}
		Some(Job { attempt: self.attempt + 1, ..self })
	}

	/// how long to wait before attempting this job again
	pub fn backoff(&self) -> std::time::Duration {
		let secs = match self.attempt {
			0 => 10,
			1 => 60,
			2 => 5 * 60,
			3 => 20 * 60,
			4 => 60 * 60,
			_ => 6 * 60 * 60,
		};
		std::time::Duration::from_secs(secs)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
	#[error("delivery queue is full, dropping {0} job for {1}")]
	Full(JobKind, String),

	#[error("delivery queue is closed, dropping {0} job for {1}")]
	Closed(JobKind, String),
}

pub type JobReceiver = mpsc::Receiver<Job>;

/// submission side of the bounded delivery queue
#[derive(Clone)]
pub struct Queue {
	tx: mpsc::Sender<Job>,
}

impl Queue {
	pub fn new(capacity: usize) -> (Self, JobReceiver) {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		(Queue { tx }, rx)
	}

	/// never waits, a full queue is reported as error
	pub fn enqueue(&self, job: Job) -> Result<(), QueueError> {
		self.tx.try_send(job).map_err(|e| match e {
			mpsc::error::TrySendError::Full(j) => QueueError::Full(j.kind, j.inbox),
			mpsc::error::TrySendError::Closed(j) => QueueError::Closed(j.kind, j.inbox),
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn retry_budget_is_respected() {
		let job = Job::new(JobKind::Registor, "https://a.example/inbox".into(), "{}".into(), 2);
		let job = job.repeat().unwrap();
		assert_eq!(job.attempt, 1);
		let job = job.repeat().unwrap();
		assert_eq!(job.attempt, 2);
		assert!(job.repeat().is_none());

		assert!(Job::new(JobKind::Relay, "https://a.example/inbox".into(), "{}".into(), 0).repeat().is_none());
	}

	#[test]
	fn full_queue_is_a_distinct_error() {
		let (queue, mut rx) = Queue::new(1);
		queue.enqueue(Job::new(JobKind::Relay, "https://a.example/inbox".into(), "{}".into(), 0)).unwrap();
		assert!(matches!(
			queue.enqueue(Job::new(JobKind::Relay, "https://b.example/inbox".into(), "{}".into(), 0)),
			Err(QueueError::Full(JobKind::Relay, _))
		));
		assert_eq!(rx.try_recv().unwrap().domain(), "a.example");
		drop(rx);
		assert!(matches!(
			queue.enqueue(Job::new(JobKind::Relay, "https://b.example/inbox".into(), "{}".into(), 0)),
			Err(QueueError::Closed(..))
		));
	}
}
