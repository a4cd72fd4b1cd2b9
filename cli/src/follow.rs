use relay::{membership::Membership, model::PendingKind};

#[derive(Debug, Clone, clap::Subcommand)]
pub enum FollowCommand {
	/// list follow requests waiting for approval or for instance metadata
	List,

	/// accept follow requests from these domains
	Accept {
		domains: Vec<String>,
	},

	/// reject follow requests from these domains
	Reject {
		domains: Vec<String>,
	},

	/// send an Update of the relay actor to every subscriber
	Update,
}

async fn pending_kind(ctx: &relay::Context, domain: &str) -> crate::CliResult<Option<PendingKind>> {
	for kind in [PendingKind::Manual, PendingKind::Auto] {
		if ctx.state().pending(kind, domain).await?.is_some() {
			return Ok(Some(kind));
		}
	}
	Ok(None)
}

pub async fn follow(ctx: relay::Context, action: FollowCommand) -> crate::CliResult<()> {
	match action {
		FollowCommand::List => {
			let mut total = 0;
			for kind in [PendingKind::Manual, PendingKind::Auto] {
				for domain in ctx.state().pending_domains(kind).await? {
					println!("{domain}\t{kind:?}");
					total += 1;
				}
			}
			println!("total: {total}");
		},

		FollowCommand::Accept { domains } => {
			for domain in domains {
				let Some(kind) = pending_kind(&ctx, &domain).await? else {
					tracing::warn!("no follow request from {domain}");
					continue;
				};
				// metadata decides whether we follow back, accept anyway without it
				let info = match ctx.fetcher().pull_instance(&domain).await {
					Ok(info) => Some(info),
					Err(e) => {
						tracing::warn!("could not fetch instance info of {domain}: {e}");
						None
					},
				};
				ctx.accept_pending(kind, &domain, info.as_ref()).await?;
			}
		},

		FollowCommand::Reject { domains } => {
			for domain in domains {
				let Some(kind) = pending_kind(&ctx, &domain).await? else {
					tracing::warn!("no follow request from {domain}");
					continue;
				};
				ctx.reject_pending(kind, &domain).await?;
			}
		},

		FollowCommand::Update => {
			let count = ctx.broadcast_actor();
			tracing::info!("scheduled actor update for {count} subscribers");
		},
	}

	Ok(())
}

#[cfg(test)]
mod test {
	use relay::{context::Role, model::PendingKind, testing};

	use super::{follow, FollowCommand};

	#[tokio::test]
	async fn manual_requests_are_decided_by_operator() {
		let mut relay = testing::relay_as(Default::default(), Role::Admin).await;
		relay.remote("a.example", "pleroma", 10);
		relay.ctx.state().set_pending(PendingKind::Manual, &testing::pending("a.example")).await.unwrap();
		relay.ctx.state().set_pending(PendingKind::Auto, &testing::pending("b.example")).await.unwrap();

		follow(relay.ctx.clone(), FollowCommand::Accept { domains: vec!["a.example".into()] }).await.unwrap();
		follow(relay.ctx.clone(), FollowCommand::Reject { domains: vec!["b.example".into(), "c.example".into()] }).await.unwrap();

		assert!(relay.ctx.state().subscriptions().contains("a.example"));
		assert!(relay.ctx.state().pending_domains(PendingKind::Manual).await.unwrap().is_empty());
		assert!(relay.ctx.state().pending_domains(PendingKind::Auto).await.unwrap().is_empty());
		let jobs = testing::drain(&mut relay.jobs);
		let kinds : Vec<String> = jobs.iter().map(testing::activity_type).collect();
		assert_eq!(kinds, vec!["Accept".to_string(), "Follow".to_string(), "Reject".to_string()]);
		assert!(jobs.iter().all(|j| j.retry == relay.ctx.cfg().delivery.admin_retry));
	}

	#[tokio::test]
	async fn accept_without_metadata_skips_follow_back() {
		let mut relay = testing::relay_as(Default::default(), Role::Admin).await;
		relay.ctx.state().set_pending(PendingKind::Manual, &testing::pending("dark.example")).await.unwrap();

		follow(relay.ctx.clone(), FollowCommand::Accept { domains: vec!["dark.example".into()] }).await.unwrap();

		assert!(relay.ctx.state().subscriptions().contains("dark.example"));
		let kinds : Vec<String> = testing::drain(&mut relay.jobs).iter().map(testing::activity_type).collect();
		assert_eq!(kinds, vec!["Accept".to_string()]);
	}
}
