use relay::membership::Membership;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DomainKind {
	#[default]
	Subscriber,
	Limited,
	Blocked,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum DomainCommand {
	/// list domains of given kind
	List {
		#[arg(long = "type", value_enum, default_value_t = DomainKind::Subscriber)]
		kind: DomainKind,
	},

	/// mark domains as limited or blocked
	Set {
		#[arg(long = "type", value_enum)]
		kind: DomainKind,

		/// remove the mark instead
		#[arg(long, default_value_t = false)]
		undo: bool,

		domains: Vec<String>,
	},

	/// drop subscribers, sending them a Reject for their follow
	Unfollow {
		domains: Vec<String>,
	},
}

pub async fn domain(ctx: relay::Context, action: DomainCommand) -> crate::CliResult<()> {
	match action {
		DomainCommand::List { kind } => {
			let domains : Vec<String> = match kind {
				DomainKind::Subscriber => ctx.state().subscriptions().iter().map(|s| s.domain.clone()).collect(),
				DomainKind::Limited => ctx.state().limited_domains().iter().cloned().collect(),
				DomainKind::Blocked => ctx.state().blocked_domains().iter().cloned().collect(),
			};
			for domain in &domains {
				println!("{domain}");
			}
			println!("total: {}", domains.len());
		},

		DomainCommand::Set { kind, undo, domains } => {
			for domain in domains {
				match kind {
					DomainKind::Limited => ctx.state().set_limited(&domain, !undo).await?,
					DomainKind::Blocked => ctx.state().set_blocked(&domain, !undo).await?,
					DomainKind::Subscriber => return Err(crate::CliError::Invalid(
						"subscribers can't be set, they must follow the relay".to_string()
					)),
				}
				tracing::info!("{} {domain} as {kind:?}", if undo { "unset" } else { "set" });
			}
		},

		DomainCommand::Unfollow { domains } => {
			for domain in domains {
				if ctx.evict(&domain, "removed by relay operator").await? {
					tracing::info!("unfollowed {domain}");
				} else {
					tracing::warn!("{domain} is not a subscriber");
				}
			}
		},
	}

	Ok(())
}
