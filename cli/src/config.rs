use relay::{model::Toggle, state::RelayDump};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigToggle {
	ServiceBlock,
	ManuallyAccept,
	CreateAsAnnounce,
}

impl From<ConfigToggle> for Toggle {
	fn from(value: ConfigToggle) -> Self {
		match value {
			ConfigToggle::ServiceBlock => Toggle::BlockService,
			ConfigToggle::ManuallyAccept => Toggle::ManuallyAccept,
			ConfigToggle::CreateAsAnnounce => Toggle::CreateAsAnnounce,
		}
	}
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum ConfigCommand {
	/// show relay toggles
	List,

	/// turn relay toggles on
	Enable {
		/// turn them off instead
		#[arg(long, default_value_t = false)]
		disable: bool,

		#[arg(value_enum, required = true)]
		toggles: Vec<ConfigToggle>,
	},

	/// print relay state as json
	Export,

	/// load relay state from a json dump
	Import {
		file: std::path::PathBuf,
	},

	/// ask running relays to reload their domain rules
	Reload,
}

pub async fn config(ctx: relay::Context, action: ConfigCommand) -> crate::CliResult<()> {
	match action {
		ConfigCommand::List => {
			let toggles = ctx.state().toggles();
			for toggle in Toggle::ALL {
				println!("{toggle}: {}", toggles.get(toggle));
			}
		},

		ConfigCommand::Enable { disable, toggles } => {
			for toggle in toggles {
				let toggle = Toggle::from(toggle);
				ctx.state().set_toggle(toggle, !disable).await?;
				tracing::info!("{toggle} {}", if disable { "disabled" } else { "enabled" });
			}
		},

		ConfigCommand::Export => {
			let dump = ctx.state().export().await?;
			println!("{}", serde_json::to_string_pretty(&dump)?);
		},

		ConfigCommand::Import { file } => {
			let dump : RelayDump = serde_json::from_str(&std::fs::read_to_string(file)?)?;
			ctx.state().import(&dump).await?;
			tracing::info!(
				"imported {} subscriptions, {} limited and {} blocked domains",
				dump.subscriptions.len(), dump.limited_domains.len(), dump.blocked_domains.len(),
			);
		},

		ConfigCommand::Reload => {
			ctx.state().request_reload().await?;
			tracing::info!("reload requested");
		},
	}

	Ok(())
}

#[cfg(test)]
mod test {
	use relay::{context::Role, testing};

	use super::{config, ConfigCommand, ConfigToggle};

	#[tokio::test]
	async fn toggles_are_switched() {
		let relay = testing::relay_as(Default::default(), Role::Admin).await;

		config(relay.ctx.clone(), ConfigCommand::Enable {
			disable: false, toggles: vec![ConfigToggle::ServiceBlock, ConfigToggle::CreateAsAnnounce],
		}).await.unwrap();
		let toggles = relay.ctx.state().toggles();
		assert!(toggles.block_service);
		assert!(toggles.create_as_announce);
		assert!(!toggles.manually_accept);

		config(relay.ctx.clone(), ConfigCommand::Enable {
			disable: true, toggles: vec![ConfigToggle::ServiceBlock],
		}).await.unwrap();
		assert!(!relay.ctx.state().toggles().block_service);
	}

	#[tokio::test]
	async fn dumps_can_be_imported() {
		let source = testing::relay_as(Default::default(), Role::Admin).await;
		source.subscribe("a.example", "mastodon").await;
		source.ctx.state().set_blocked("evil.example", true).await.unwrap();
		let dump = source.ctx.state().export().await.unwrap();

		let path = std::env::temp_dir().join(format!("relay-dump-{}.json", std::process::id()));
		std::fs::write(&path, serde_json::to_string(&dump).unwrap()).unwrap();

		let target = testing::relay_as(Default::default(), Role::Admin).await;
		config(target.ctx.clone(), ConfigCommand::Import { file: path.clone() }).await.unwrap();
		std::fs::remove_file(path).unwrap();

		assert!(target.ctx.state().subscriptions().contains("a.example"));
		assert!(target.ctx.state().blocked_domains().contains("evil.example"));
	}
}
