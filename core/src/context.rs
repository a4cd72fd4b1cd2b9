use std::sync::{Arc, RwLock};

use futures::StreamExt;
use openssl::{pkey::PKey, rsa::Rsa};

use crate::{
	cache::ActorCache,
	config::Config,
	ext::LoggableError,
	model::{Activity, Actor},
	policy::RuleSet,
	queue::{Job, JobKind, Queue},
	state::{RelayState, NOTIFY_CHANNEL, NOTIFY_RELOAD},
	store::{Store, StoreError, StoreResult},
	traits::{Fetcher, HttpFetcher, RequestError},
};

#[derive(Clone)]
pub struct Context(Arc<ContextInner>);
struct ContextInner {
	config: Config,
	domain: String,
	protocol: String,
	base_url: String,
	actor: Actor,
	pkey: String,
	role: Role,
	state: RelayState,
	rules: RwLock<Arc<RuleSet>>,
	cache: ActorCache,
	fetcher: Box<dyn Fetcher>,
	queue: Queue,
}

/// who is driving this context, changes how hard membership deliveries are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Server,
	Admin,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
	#[error("store error: {0}")]
	Store(#[from] StoreError),

	#[error("invalid relay key: {0:?}")]
	Key(#[from] openssl::error::ErrorStack),

	#[error("could not access relay key file: {0}")]
	KeyFile(#[from] std::io::Error),

	#[error("could not build http client: {0}")]
	Client(#[from] RequestError),
}

#[macro_export]
macro_rules! url {
	($ctx:expr, $($args: tt)*) => {
		format!("{}{}", $ctx.base(), format!($($args)*))
	};
}

/// read relay private key, generating a new one on first start
pub fn load_or_generate_key(path: &str) -> Result<String, InitError> {
	match std::fs::read_to_string(path) {
		Ok(pem) => Ok(pem),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			tracing::warn!("relay key '{path}' not found, generating a new one");
			let key = Rsa::generate(2048)?;
			let pem = String::from_utf8_lossy(&key.private_key_to_pem()?).to_string();
			std::fs::write(path, &pem)?;
			Ok(pem)
		},
		Err(e) => Err(e.into()),
	}
}

fn split_domain(mut domain: String) -> (String, String) {
	let protocol = if domain.starts_with("http://")
	{ "http://" } else { "https://" }.to_string();
	if domain.ends_with('/') {
		domain.replace_range(domain.len()-1.., "");
	}
	if domain.starts_with("http") {
		domain = domain.replace("https://", "").replace("http://", "");
	}
	(domain, protocol)
}

impl Context {
	pub async fn new(
		config: Config,
		domain: String,
		store: Arc<dyn Store>,
		pkey: String,
		queue: Queue,
		role: Role,
	) -> Result<Self, InitError> {
		let (bare, protocol) = split_domain(domain.clone());
		let user_agent = format!("ActivityPub-Relay/{} (+{protocol}{bare})", crate::VERSION);
		let fetcher = HttpFetcher::new(
			config.security.request_timeout,
			&user_agent,
			format!("{protocol}{bare}/actor#main-key"),
			pkey.clone(),
		)?;
		Self::with_fetcher(config, domain, store, pkey, queue, role, Box::new(fetcher)).await
	}

	pub async fn with_fetcher(
		config: Config,
		domain: String,
		store: Arc<dyn Store>,
		pkey: String,
		queue: Queue,
		role: Role,
		fetcher: Box<dyn Fetcher>,
	) -> Result<Self, InitError> {
		let (domain, protocol) = split_domain(domain);
		let base_url = format!("{}{}", protocol, domain);

		let public_key = PKey::private_key_from_pem(pkey.as_bytes())?.public_key_to_pem()?;
		let actor = Actor::relay(&base_url, &config.instance, String::from_utf8_lossy(&public_key).to_string());

		let state = RelayState::new(store);
		state.load().await?;

		let rules = RwLock::new(Arc::new(RuleSet::load(&config.rules)));
		let cache = ActorCache::new(std::time::Duration::from_secs(config.security.actor_cache_seconds));

		Ok(Context(Arc::new(ContextInner {
			config, domain, protocol, base_url, actor, pkey, role, state, rules, cache, fetcher, queue,
		})))
	}

	pub fn actor(&self) -> &Actor {
		&self.0.actor
	}

	pub fn pkey(&self) -> &str {
		&self.0.pkey
	}

	pub fn cfg(&self) -> &Config {
		&self.0.config
	}

	pub fn domain(&self) -> &str {
		&self.0.domain
	}

	pub fn protocol(&self) -> &str {
		&self.0.protocol
	}

	pub fn base(&self) -> &str {
		&self.0.base_url
	}

	pub fn state(&self) -> &RelayState {
		&self.0.state
	}

	pub fn fetcher(&self) -> &dyn Fetcher {
		self.0.fetcher.as_ref()
	}

	pub fn queue(&self) -> &Queue {
		&self.0.queue
	}

	pub fn cache(&self) -> &ActorCache {
		&self.0.cache
	}

	pub fn server(id: &str) -> String {
		crate::ext::domain_of(id)
	}

	pub fn rules(&self) -> Arc<RuleSet> {
		match self.0.rules.read() {
			Ok(x) => x.clone(),
			Err(e) => e.into_inner().clone(),
		}
	}

	/// re-read domain rules from config and rule files
	pub fn reload_rules(&self) {
		let rules = Arc::new(RuleSet::load(&self.cfg().rules));
		match self.0.rules.write() {
			Ok(mut x) => *x = rules,
			Err(e) => *e.into_inner() = rules,
		}
	}

	/// remote actor, from cache when fresh
	pub async fn resolve_actor(&self, url: &str) -> Result<Actor, RequestError> {
		if let Some(actor) = self.cache().get(url) {
			return Ok(actor);
		}
		let actor = self.fetcher().pull_actor(url, self.cfg().security.authorized_fetch).await?;
		self.cache().insert(url, actor.clone());
		Ok(actor)
	}

	fn registor_retry(&self) -> u32 {
		match self.0.role {
			Role::Server => self.cfg().delivery.response_retry,
			Role::Admin => self.cfg().delivery.admin_retry,
		}
	}

	/// schedule delivery of a relay issued activity
	pub fn deliver(&self, inbox: &str, activity: &Activity) {
		let payload = match serde_json::to_string(activity) {
			Ok(x) => x,
			Err(e) => {
				tracing::error!("could not serialize {} for {inbox}: {e}", activity.activity_type);
				return;
			},
		};
		tracing::debug!("scheduling {} delivery to {inbox}", activity.activity_type);
		self.queue()
			.enqueue(Job::new(JobKind::Registor, inbox.to_string(), payload, self.registor_retry()))
			.err_failed("could not schedule delivery");
	}

	/// fan out a payload to every subscriber except the one it came from
	pub fn relay(&self, source: &str, payload: &str) {
		let retry = self.cfg().delivery.relay_retry;
		let mut count = 0;
		for sub in self.state().subscriptions().iter().filter(|s| s.domain != source) {
			self.queue()
				.enqueue(Job::new(JobKind::Relay, sub.inbox_url.clone(), payload.to_string(), retry))
				.err_failed("could not schedule relay");
			count += 1;
		}
		tracing::debug!("relaying activity from {source} to {count} subscribers");
	}

	/// keep mirrors and rules in sync with changes made by other processes
	pub async fn watch_notifications(&self) -> StoreResult<()> {
		let mut notifications = self.state().store().subscribe(NOTIFY_CHANNEL).await?;
		while let Some(msg) = notifications.next().await {
			if msg == NOTIFY_RELOAD {
				tracing::info!("reloading domain rules on request");
				self.reload_rules();
			} else {
				self.state().load().await.err_failed("failed refreshing relay state");
			}
		}
		tracing::warn!("notification channel closed");
		Ok(())
	}
}
