#[serde_inline_default::serde_inline_default]
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, serde_default::DefaultFromSerde)]
pub struct Config {
	#[serde(default)]
	pub instance: InstanceConfig,

	#[serde(default)]
	pub datasource: DatasourceConfig,

	#[serde(default)]
	pub security: SecurityConfig,

	#[serde(default)]
	pub rules: RulesConfig,

	#[serde(default)]
	pub delivery: DeliveryConfig,
}

#[serde_inline_default::serde_inline_default]
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, serde_default::DefaultFromSerde)]
pub struct InstanceConfig {
	#[serde_inline_default("ActivityPub Relay".into())]
	/// relay name, shown in nodeinfo, status page and relay actor
	pub name: String,

	#[serde_inline_default("federated activity relay".into())]
	/// description, shown in relay actor
	pub summary: String,

	#[serde_inline_default("http://127.0.0.1:8080".into())]
	/// domain of current relay, must change this for prod
	pub domain: String,

	#[serde(default)]
	/// url of relay actor avatar
	pub icon: String,

	#[serde(default)]
	/// url of relay actor banner
	pub image: String,

	#[serde_inline_default("actor.pem".into())]
	/// path to PEM encoded RSA private key of the relay actor
	pub private_key: String,
}

#[serde_inline_default::serde_inline_default]
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, serde_default::DefaultFromSerde)]
pub struct DatasourceConfig {
	#[serde_inline_default("redis://127.0.0.1:6379".into())]
	/// store connection uri, `redis://...` or `memory://` for a volatile in-process store
	pub connection_string: String,
}

#[serde_inline_default::serde_inline_default]
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, serde_default::DefaultFromSerde)]
pub struct SecurityConfig {
	#[serde(default)]
	/// skip inbound signature verification, but sign actor fetches (for peers enforcing authorized fetch)
	pub authorized_fetch: bool,

	#[serde_inline_default(5)]
	/// max time, in seconds, before outgoing requests fail with timeout
	pub request_timeout: u64,

	#[serde_inline_default(300)]
	/// how long fetched remote actors stay cached, in seconds
	pub actor_cache_seconds: u64,

	#[serde_inline_default("origin".into())]
	/// where to take remote address from: `origin` for the socket peer, anything else is a header name
	pub ip_source: String,
}

#[serde_inline_default::serde_inline_default]
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, serde_default::DefaultFromSerde)]
pub struct RulesConfig {
	#[serde(default)]
	/// follow requests wait for an operator decision, written into the store at startup
	pub manual_accept: bool,

	#[serde(default)]
	/// max number of subscribed instances, 0 means unlimited
	pub max_instances: usize,

	#[serde(default)]
	/// regex patterns of domains allowed to subscribe, when not empty every other domain is rejected
	pub allow: Vec<String>,

	#[serde(default)]
	/// regex patterns of domains which can't subscribe, only used when allow list is empty
	pub block: Vec<String>,

	#[serde(default)]
	/// file with additional allow patterns, one per line
	pub allow_file: Option<String>,

	#[serde(default)]
	/// file with additional block patterns, one per line
	pub block_file: Option<String>,

	#[serde(default)]
	/// compare thresholds against monthly active users rather than total users
	pub user_by_active: bool,

	#[serde(default)]
	/// instances with less users than this are not admitted
	pub allow_min_user: u64,

	#[serde(default)]
	/// instances with more users than this are not admitted, 0 means unbounded
	pub allow_max_user: u64,

	#[serde(default)]
	/// subscribers with less users than this get kicked
	pub kick_min_user: u64,

	#[serde(default)]
	/// subscribers with more users than this get kicked, 0 means unbounded
	pub kick_max_user: u64,

	#[serde_inline_default(3600)]
	/// interval, in seconds, between instance info refreshes (never less than 300)
	pub update_rate: u64,

	#[serde_inline_default(5)]
	/// kick subscribers after this many failed instance info refreshes
	pub kick_after: u32,
}

#[serde_inline_default::serde_inline_default]
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, serde_default::DefaultFromSerde)]
pub struct DeliveryConfig {
	#[serde_inline_default(200)]
	/// how many deliveries can run concurrently
	pub concurrency: usize,

	#[serde_inline_default(8192)]
	/// how many deliveries can wait in queue before new ones get dropped
	pub queue_size: usize,

	#[serde_inline_default(2)]
	/// retries for accept/reject/follow-back deliveries issued by the server
	pub response_retry: u32,

	#[serde_inline_default(25)]
	/// retries for deliveries issued from the admin cli
	pub admin_retry: u32,

	#[serde(default)]
	/// retries for relayed activities
	pub relay_retry: u32,
}

impl Config {
	pub fn load(path: Option<&std::path::PathBuf>) -> Self {
		let Some(cfg_path) = path else { return Config::default() };
		match std::fs::read_to_string(cfg_path) {
			Ok(x) => match toml::from_str(&x) {
				Ok(cfg) => return cfg,
				Err(e) => tracing::error!("failed parsing config file: {e}"),
			},
			Err(e) => tracing::error!("failed reading config file: {e}"),
		}
		Config::default()
	}
}
