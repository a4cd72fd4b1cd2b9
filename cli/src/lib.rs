mod domain;
pub use domain::*;

mod follow;
pub use follow::*;

mod config;
pub use config::*;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
	#[error("store error: {0}")]
	Store(#[from] relay::store::StoreError),

	#[error("invalid relay dump: {0}")]
	Json(#[from] serde_json::Error),

	#[error("could not read file: {0}")]
	Io(#[from] std::io::Error),

	#[error("{0}")]
	Invalid(String),
}

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Clone, clap::Subcommand)]
pub enum CliCommand {
	/// manage subscriber, limited and blocked domains
	Domain {
		#[clap(subcommand)]
		action: DomainCommand,
	},

	/// manage follow requests waiting for a decision
	Follow {
		#[clap(subcommand)]
		action: FollowCommand,
	},

	/// manage relay toggles and state dumps
	Config {
		#[clap(subcommand)]
		action: ConfigCommand,
	},
}

pub async fn run(ctx: relay::Context, command: CliCommand) -> Result<(), CliError> {
	tracing::info!("running cli task: {command:?}");
	match command {
		CliCommand::Domain { action } => domain(ctx, action).await,
		CliCommand::Follow { action } => follow(ctx, action).await,
		CliCommand::Config { action } => config(ctx, action).await,
	}
}
