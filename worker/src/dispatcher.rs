use std::time::Duration;

use relay::{
	ext::LoggableError,
	queue::{Job, JobKind, JobReceiver},
	traits::RequestError,
	Context,
};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("delivery failed: {0}")]
	Request(#[from] RequestError),
}

pub type JobResult<T> = Result<T, JobError>;

#[async_trait::async_trait]
pub trait JobDispatcher : Sized {
	/// consume jobs until stopped, keeping at most `concurrency` deliveries in flight
	async fn run(self, jobs: JobReceiver, concurrency: usize, stop: impl crate::StopToken);

	/// process whatever is queued and wait for it, up to `timeout`; returns jobs left undelivered
	async fn drain(self, jobs: JobReceiver, concurrency: usize, timeout: Duration) -> usize;
}

#[async_trait::async_trait]
impl JobDispatcher for Context {
	async fn run(self, mut jobs: JobReceiver, concurrency: usize, mut stop: impl crate::StopToken) {
		let concurrency = concurrency.max(1);
		let mut pool = tokio::task::JoinSet::new();

		loop {
			let job = tokio::select! {
				job = jobs.recv() => match job {
					Some(job) => job,
					None => break,
				},
				_ = stop.stopped() => break,
			};

			pool.spawn(attempt(self.clone(), job));

			while pool.len() >= concurrency {
				if let Some(Err(e)) = pool.join_next().await {
					tracing::error!("failed joining delivery task: {e}");
				}
			}
		}

		tracing::info!("delivery workers stopped, leaving {} deliveries running", pool.len());
		pool.detach_all();
	}

	async fn drain(self, mut jobs: JobReceiver, concurrency: usize, timeout: Duration) -> usize {
		let concurrency = concurrency.max(1);
		let deadline = tokio::time::Instant::now() + timeout;
		let mut pool = tokio::task::JoinSet::new();

		loop {
			while pool.len() < concurrency {
				match jobs.try_recv() {
					Ok(job) => { pool.spawn(attempt(self.clone(), job)); },
					Err(_) => break,
				}
			}

			if pool.is_empty() {
				break;
			}

			match tokio::time::timeout_at(deadline, pool.join_next()).await {
				Ok(Some(Err(e))) => tracing::error!("failed joining delivery task: {e}"),
				Ok(_) => {},
				Err(_) => {
					tracing::warn!("timed out waiting for deliveries");
					break;
				},
			}
		}

		let mut left = pool.len();
		while jobs.try_recv().is_ok() {
			left += 1;
		}
		left
	}
}

/// deliver a job, sleeping through its backoff between attempts while budget lasts
async fn attempt(ctx: Context, mut job: Job) {
	loop {
		let Err(e) = crate::delivery::process(&ctx, &job).await else {
			return;
		};

		tracing::warn!("failed {} delivery to {}: {e}", job.kind, job.inbox);
		if job.kind == JobKind::Relay {
			ctx.state()
				.mark_delivery_error(&job.domain(), &e.to_string())
				.await
				.warn_failed("could not record delivery error");
		}

		let wait = job.backoff();
		let Some(next) = job.clone().repeat() else {
			if job.retry > 0 {
				tracing::info!("giving up {} delivery to {} after {} attempts", job.kind, job.inbox, job.attempt + 1);
			}
			return;
		};

		tokio::time::sleep(wait).await;
		job = next;
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use relay::{context::Role, queue::{Job, JobKind}, testing, Config};

	use super::JobDispatcher;

	fn job(kind: JobKind, domain: &str, retry: u32) -> Job {
		Job::new(kind, format!("https://{domain}/inbox"), "{\"type\":\"Accept\"}".into(), retry)
	}

	#[tokio::test(start_paused = true)]
	async fn jobs_are_pushed_to_inboxes() {
		let testing::TestRelay { ctx, fetcher, jobs } = testing::relay(Default::default()).await;
		let (tx, stop) = crate::test::stop_token();
		let worker = crate::spawn(ctx.clone(), jobs, 4, stop);

		ctx.queue().enqueue(job(JobKind::Registor, "a.example", 2)).unwrap();
		ctx.queue().enqueue(job(JobKind::Relay, "b.example", 0)).unwrap();
		tokio::time::sleep(Duration::from_secs(1)).await;

		let mut inboxes : Vec<String> = fetcher.pushed().into_iter().map(|(inbox, _)| inbox).collect();
		inboxes.sort();
		assert_eq!(inboxes, vec!["https://a.example/inbox".to_string(), "https://b.example/inbox".to_string()]);

		tx.send(true).unwrap();
		worker.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn failed_relay_is_recorded_and_not_retried() {
		let testing::TestRelay { ctx, fetcher, jobs } = testing::relay(Default::default()).await;
		let (tx, stop) = crate::test::stop_token();
		let worker = crate::spawn(ctx.clone(), jobs, 4, stop);
		fetcher.make_unreachable("b.example");

		ctx.queue().enqueue(job(JobKind::Relay, "b.example", ctx.cfg().delivery.relay_retry)).unwrap();
		tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;

		assert_eq!(fetcher.attempts(), 1);
		assert!(ctx.state().delivery_error("b.example").await.unwrap().is_some());

		tx.send(true).unwrap();
		worker.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn registor_jobs_back_off_until_budget_ends() {
		let testing::TestRelay { ctx, fetcher, jobs } = testing::relay(Default::default()).await;
		let (tx, stop) = crate::test::stop_token();
		let worker = crate::spawn(ctx.clone(), jobs, 4, stop);
		fetcher.make_unreachable("a.example");

		ctx.queue().enqueue(job(JobKind::Registor, "a.example", 2)).unwrap();

		tokio::time::sleep(Duration::from_secs(5)).await;
		assert_eq!(fetcher.attempts(), 1);
		tokio::time::sleep(Duration::from_secs(10)).await;
		assert_eq!(fetcher.attempts(), 2);
		tokio::time::sleep(Duration::from_secs(60)).await;
		assert_eq!(fetcher.attempts(), 3);
		tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
		assert_eq!(fetcher.attempts(), 3);
		// membership traffic does not mark the peer
		assert!(ctx.state().delivery_error("a.example").await.unwrap().is_none());

		tx.send(true).unwrap();
		worker.await.unwrap();
	}

	#[tokio::test]
	async fn drain_delivers_queued_jobs() {
		let mut config = Config::default();
		config.delivery.concurrency = 2;
		let testing::TestRelay { ctx, fetcher, jobs } = testing::relay(config).await;
		for domain in ["a.example", "b.example", "c.example"] {
			ctx.queue().enqueue(job(JobKind::Registor, domain, 25)).unwrap();
		}

		let left = ctx.clone().drain(jobs, ctx.cfg().delivery.concurrency, Duration::from_secs(5)).await;

		assert_eq!(left, 0);
		assert_eq!(fetcher.pushed().len(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn drain_waits_for_admin_retries_until_deadline() {
		let testing::TestRelay { ctx, fetcher, jobs } = testing::relay_as(Default::default(), Role::Admin).await;
		fetcher.make_unreachable("a.example");
		ctx.deliver("https://a.example/inbox", &testing::follow("a.example"));

		let left = ctx.clone().drain(jobs, 4, Duration::from_secs(30)).await;

		// first attempt, then one retry after 10s, the next one is due past the deadline
		assert_eq!(fetcher.attempts(), 2);
		assert_eq!(left, 1);
	}
}
