pub mod dispatcher;
pub mod delivery;
pub mod reconcile;

pub use dispatcher::{JobError, JobResult};

/// start the delivery pool, consuming jobs until stopped or until every queue handle is gone
pub fn spawn(
	ctx: relay::Context,
	jobs: relay::queue::JobReceiver,
	concurrency: usize,
	stop: impl StopToken,
) -> tokio::task::JoinHandle<()> {
	use dispatcher::JobDispatcher;
	tokio::spawn(async move {
		tracing::info!("starting delivery workers");
		ctx.run(jobs, concurrency, stop).await
	})
}

pub trait StopToken: Clone + Sync + Send + 'static {
	fn stop(&self) -> bool;

	/// resolves once stop has been requested
	fn stopped(&mut self) -> impl std::future::Future<Output = ()> + std::marker::Send;
}

#[cfg(test)]
pub(crate) mod test {
	#[derive(Clone)]
	pub struct Stop(tokio::sync::watch::Receiver<bool>);

	impl super::StopToken for Stop {
		fn stop(&self) -> bool {
			*self.0.borrow()
		}

		async fn stopped(&mut self) {
			loop {
				let stopped = *self.0.borrow_and_update();
				if stopped { return }
				if self.0.changed().await.is_err() {
					std::future::pending::<()>().await
				}
			}
		}
	}

	pub fn stop_token() -> (tokio::sync::watch::Sender<bool>, Stop) {
		let (tx, rx) = tokio::sync::watch::channel(false);
		(tx, Stop(rx))
	}
}
