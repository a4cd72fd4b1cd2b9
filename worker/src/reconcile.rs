//! periodic upkeep of subscriber metadata, pending requests and admission limits

use std::time::Duration;

use relay::{
	membership::Membership,
	model::{PendingKind, SubscriptionInfo},
	policy::{self, Admission, Eviction},
	store::StoreResult,
	Config, Context,
};

use crate::StopToken;

/// instance metadata is never refreshed more often than this
pub const MIN_REFRESH_SECONDS: u64 = 300;
pub const PENDING_RECHECK_SECONDS: u64 = 60;
pub const KICK_SWEEP_SECONDS: u64 = 600;
/// rechecks an auto-pending request survives without metadata
pub const PENDING_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loop {
	InstanceRefresh,
	PendingRecheck,
	KickSweep,
}

impl std::fmt::Display for Loop {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Loop::InstanceRefresh => write!(f, "instance refresh"),
			Loop::PendingRecheck => write!(f, "pending recheck"),
			Loop::KickSweep => write!(f, "kick sweep"),
		}
	}
}

impl Loop {
	pub fn period(&self, cfg: &Config) -> Duration {
		Duration::from_secs(match self {
			Loop::InstanceRefresh => cfg.rules.update_rate.max(MIN_REFRESH_SECONDS),
			Loop::PendingRecheck => PENDING_RECHECK_SECONDS,
			Loop::KickSweep => KICK_SWEEP_SECONDS,
		})
	}
}

/// start all reconciliation loops, they end when stop is requested
pub fn spawn(ctx: Context, stop: impl StopToken) -> tokio::task::JoinSet<()> {
	let mut tasks = tokio::task::JoinSet::new();
	for which in [Loop::InstanceRefresh, Loop::PendingRecheck, Loop::KickSweep] {
		tasks.spawn(run(ctx.clone(), stop.clone(), which));
	}
	tasks
}

/// sleep for a period, false if stop was requested meanwhile
async fn pause(stop: &mut impl StopToken, period: Duration) -> bool {
	tokio::select! {
		_ = tokio::time::sleep(period) => !stop.stop(),
		_ = stop.stopped() => false,
	}
}

async fn run(ctx: Context, mut stop: impl StopToken, which: Loop) {
	let period = which.period(ctx.cfg());
	tracing::info!("running {which} every {}s", period.as_secs());

	while pause(&mut stop, period).await {
		let res = match which {
			Loop::InstanceRefresh => refresh_instances(&ctx, &stop).await,
			Loop::PendingRecheck => recheck_pending(&ctx, &stop).await,
			Loop::KickSweep => kick_sweep(&ctx, &stop).await,
		};
		match res {
			Ok(0) => {},
			Ok(n) => tracing::info!("{which} changed {n} domains"),
			Err(e) => tracing::error!("{which} failed, skipping iteration: {e}"),
		}
	}

	tracing::info!("{which} stopped");
}

/// refetch metadata of every subscriber, evicting the ones unreachable for too long
pub async fn refresh_instances(ctx: &Context, stop: &impl StopToken) -> StoreResult<usize> {
	let mut evicted = 0;
	let subscriptions = ctx.state().subscriptions();

	for sub in subscriptions.iter() {
		if stop.stop() { break }

		match ctx.fetcher().pull_instance(&sub.domain).await {
			Ok(info) => ctx.state().set_info(&info).await?,
			Err(e) => {
				let mut info = ctx.state().info(&sub.domain).await?
					.unwrap_or_else(|| SubscriptionInfo { domain: sub.domain.clone(), ..Default::default() });
				info.retry += 1;
				tracing::debug!("could not refresh {} (failure {}): {e}", sub.domain, info.retry);
				if info.retry > ctx.cfg().rules.kick_after {
					ctx.evict(&sub.domain, &format!("unreachable for {} refreshes", info.retry)).await?;
					evicted += 1;
				} else {
					ctx.state().set_info(&info).await?;
				}
			},
		}
	}

	Ok(evicted)
}

/// retry admission of follow requests waiting for instance metadata
pub async fn recheck_pending(ctx: &Context, stop: &impl StopToken) -> StoreResult<usize> {
	let mut decided = 0;

	for domain in ctx.state().pending_domains(PendingKind::Auto).await? {
		if stop.stop() { break }

		let Some(mut pending) = ctx.state().pending(PendingKind::Auto, &domain).await? else {
			continue;
		};
		pending.retry += 1;

		match ctx.fetcher().pull_instance(&domain).await {
			Ok(info) => {
				ctx.state().set_info(&info).await?;
				let subscribers = ctx.state().subscriptions().len();
				match policy::follow_admission(&ctx.rules(), &ctx.cfg().rules, &domain, subscribers, Some(&info)) {
					Admission::Admit => {
						ctx.accept_pending(PendingKind::Auto, &domain, Some(&info)).await?;
						decided += 1;
					},
					Admission::Reject(reason) => {
						tracing::info!("rejecting pending follow from {domain}: {reason}");
						ctx.reject_pending(PendingKind::Auto, &domain).await?;
						ctx.state().del_info(&domain).await?;
						decided += 1;
					},
					Admission::Pend => ctx.state().set_pending(PendingKind::Auto, &pending).await?,
				}
			},
			Err(e) if pending.retry >= PENDING_ATTEMPTS => {
				tracing::info!("rejecting pending follow from {domain}, no metadata after {} attempts: {e}", pending.retry);
				ctx.reject_pending(PendingKind::Auto, &domain).await?;
				decided += 1;
			},
			Err(e) => {
				tracing::debug!("metadata of {domain} still unavailable: {e}");
				ctx.state().set_pending(PendingKind::Auto, &pending).await?;
			},
		}
	}

	Ok(decided)
}

/// drop subscribers that no longer satisfy domain rules or user limits
pub async fn kick_sweep(ctx: &Context, stop: &impl StopToken) -> StoreResult<usize> {
	let mut kicked = 0;
	let rules = ctx.rules();

	for domain in ctx.state().info_domains().await? {
		if stop.stop() { break }

		let Some(info) = ctx.state().info(&domain).await? else {
			continue;
		};

		if let Eviction::Kick(reason) = policy::kick_evaluation(&rules, &ctx.cfg().rules, &info) {
			if ctx.evict(&domain, &reason).await? {
				kicked += 1;
			}
		}
	}

	Ok(kicked)
}
