use std::path::PathBuf;
use clap::{Parser, Subcommand};
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use futures::stream::StreamExt;

use relay::ext::LoggableError;
use relay_worker as worker;

#[cfg(feature = "cli")]
use relay_cli as cli;

#[cfg(feature = "serve")]
use relay_routes as routes;

/// how long the cli waits for its deliveries before exiting
const CLI_DRAIN_SECONDS: u64 = 30;

#[derive(Parser)]
/// activitypub relay, forwarding public activities across subscribed instances
struct Args {
	#[clap(subcommand)]
	/// command to run
	command: Mode,

	/// path to config file, leave empty to not use any
	#[arg(short, long)]
	config: Option<PathBuf>,

	#[arg(long)]
	/// store connection uri (redis://, rediss://, unix://, memory://), overrides config value
	store: Option<String>,

	#[arg(long)]
	/// relay base domain, for AP ids, overrides config value
	domain: Option<String>,

	#[arg(long, default_value_t=false)]
	/// run with debug level tracing
	debug: bool,

	#[arg(long)]
	/// force set number of worker threads for async runtime, defaults to number of cores
	threads: Option<usize>,
}

#[derive(Clone, Subcommand)]
enum Mode {
	/// print current or default configuration
	Config,

	#[cfg(feature = "cli")]
	/// run maintenance CLI tasks
	Cli {
		#[clap(subcommand)]
		/// task to run
		command: cli::CliCommand,
	},

	#[cfg(feature = "serve")]
	/// start relay routes, delivery workers and background loops
	Serve {
		#[arg(short, long, default_value="127.0.0.1:8080")]
		/// addr to bind and serve onto
		bind: String,
	},
}

fn main() {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.compact()
		.with_max_level(if args.debug { tracing::Level::DEBUG } else { tracing::Level::INFO })
		.init();

	let config = relay::Config::load(args.config.as_ref());

	if matches!(args.command, Mode::Config) {
		println!("{}", toml::to_string_pretty(&config).expect("failed serializing config"));
		return;
	}

	let mut runtime = tokio::runtime::Builder::new_multi_thread();

	if let Some(threads) = args.threads {
		runtime.worker_threads(threads);
	}

	runtime
		.enable_io()
		.enable_time()
		.thread_name("relay-async-worker")
		.build()
		.expect("failed creating tokio async runtime")
		.block_on(async { init(args, config).await })
}

async fn init(args: Args, config: relay::Config) {
	let uri = args.store.unwrap_or(config.datasource.connection_string.clone());
	let domain = args.domain.unwrap_or(config.instance.domain.clone());

	let store = relay::store::connect(&uri)
		.await.expect("error connecting to store");

	let pkey = relay::context::load_or_generate_key(&config.instance.private_key)
		.expect("failed loading relay private key");

	let role = match args.command {
		#[cfg(feature = "cli")]
		Mode::Cli { .. } => relay::context::Role::Admin,
		_ => relay::context::Role::Server,
	};

	let (queue, jobs) = relay::queue::Queue::new(config.delivery.queue_size);

	let ctx = relay::Context::new(config.clone(), domain, store, pkey, queue, role)
		.await.expect("failed creating relay context");

	let (tx, rx) = tokio::sync::watch::channel(false);
	let signals = Signals::new([SIGTERM, SIGINT, SIGHUP, SIGUSR1]).expect("failed registering signal handler");
	let handle = signals.handle();
	let signals_task = tokio::spawn(handle_signals(signals, tx, ctx.clone()));
	let stop = CancellationToken(rx);

	let mut failed = false;

	match args.command {
		#[cfg(feature = "cli")]
		Mode::Cli { command } => {
			use worker::dispatcher::JobDispatcher;
			if let Err(e) = cli::run(ctx.clone(), command).await {
				tracing::error!("cli task failed: {e}");
				failed = true;
			}
			let left = ctx
				.drain(jobs, config.delivery.concurrency, std::time::Duration::from_secs(CLI_DRAIN_SECONDS))
				.await;
			if left > 0 {
				tracing::warn!("exiting with {left} deliveries not completed");
			}
		},

		#[cfg(feature = "serve")]
		Mode::Serve { bind } => {
			ctx.state()
				.set_toggle(relay::model::Toggle::ManuallyAccept, config.rules.manual_accept)
				.await.expect("failed writing manual accept toggle");

			let workers = worker::spawn(ctx.clone(), jobs, config.delivery.concurrency, stop.clone());
			let mut loops = worker::reconcile::spawn(ctx.clone(), stop.clone());
			let listener = tokio::spawn({
				let ctx = ctx.clone();
				async move { ctx.watch_notifications().await.err_failed("notification listener failed") }
			});

			routes::serve(ctx, bind, stop)
				.await.expect("failed serving relay routes");

			listener.abort();
			workers.await.err_failed("failed joining delivery workers");
			while let Some(res) = loops.join_next().await {
				res.err_failed("failed joining background loop");
			}
		},

		Mode::Config => unreachable!(),
	}

	handle.close();
	signals_task.await.expect("failed joining signal handler task");

	if failed {
		std::process::exit(1);
	}
}

#[derive(Clone)]
struct CancellationToken(tokio::sync::watch::Receiver<bool>);

impl worker::StopToken for CancellationToken {
	fn stop(&self) -> bool {
		*self.0.borrow()
	}

	async fn stopped(&mut self) {
		loop {
			let stopped = *self.0.borrow_and_update();
			if stopped { return }
			if self.0.changed().await.is_err() {
				// sender gone, nobody can stop us anymore
				return std::future::pending().await;
			}
		}
	}
}

#[cfg(feature = "serve")]
impl routes::ShutdownToken for CancellationToken {
	async fn event(mut self) {
		use worker::StopToken;
		self.stopped().await
	}
}

async fn handle_signals(
	mut signals: signal_hook_tokio::Signals,
	tx: tokio::sync::watch::Sender<bool>,
	ctx: relay::Context,
) {
	while let Some(signal) = signals.next().await {
		match signal {
			SIGTERM | SIGINT => {
				tracing::info!("received stop signal, closing tasks");
				tx.send(true).info_failed("error sending stop signal to tasks")
			},
			SIGHUP | SIGUSR1 => {
				tracing::info!("received reload signal, reloading domain rules");
				ctx.reload_rules();
			},
			_ => unreachable!(),
		}
	}
}
