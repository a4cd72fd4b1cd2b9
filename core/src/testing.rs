//! test doubles for the relay and crates built on top of it

use std::{collections::{BTreeMap, HashMap}, sync::{Arc, Mutex, OnceLock}};

use crate::{
	config::Config,
	context::Role,
	model::{activity::PUBLIC, actor::PublicKey, Activity, Actor, PendingFollow, Subscription, SubscriptionInfo},
	queue::{Job, JobReceiver, Queue},
	store::MemoryStore,
	traits::{Fetcher, RequestError},
	Context,
};

/// rsa keypair shared by all tests, generating one is slow
pub fn keypair() -> &'static (String, String) {
	static KEYPAIR: OnceLock<(String, String)> = OnceLock::new();
	KEYPAIR.get_or_init(|| {
		let key = openssl::rsa::Rsa::generate(2048).expect("failed generating test key");
		(
			String::from_utf8_lossy(&key.private_key_to_pem().expect("failed encoding private key")).to_string(),
			String::from_utf8_lossy(&key.public_key_to_pem().expect("failed encoding public key")).to_string(),
		)
	})
}

#[derive(Default)]
struct MockInner {
	actors: Mutex<HashMap<String, Actor>>,
	instances: Mutex<HashMap<String, SubscriptionInfo>>,
	pushed: Mutex<Vec<(String, String)>>,
	unreachable: Mutex<Vec<String>>,
	actor_fetches: Mutex<usize>,
	attempts: Mutex<usize>,
}

/// fetcher answering from memory, records pushes
#[derive(Clone, Default)]
pub struct MockFetcher(Arc<MockInner>);

impl MockFetcher {
	pub fn add_actor(&self, actor: Actor) {
		self.0.actors.lock().expect("poisoned").insert(actor.id.clone(), actor);
	}

	/// serve an actor document from an url other than its id
	pub fn add_actor_at(&self, url: &str, actor: Actor) {
		self.0.actors.lock().expect("poisoned").insert(url.to_string(), actor);
	}

	pub fn add_instance(&self, info: SubscriptionInfo) {
		self.0.instances.lock().expect("poisoned").insert(info.domain.clone(), info);
	}

	pub fn remove_instance(&self, domain: &str) {
		self.0.instances.lock().expect("poisoned").remove(domain);
	}

	/// pushes towards inboxes of this domain fail
	pub fn make_unreachable(&self, domain: &str) {
		self.0.unreachable.lock().expect("poisoned").push(domain.to_string());
	}

	pub fn pushed(&self) -> Vec<(String, String)> {
		self.0.pushed.lock().expect("poisoned").clone()
	}

	pub fn actor_fetches(&self) -> usize {
		*self.0.actor_fetches.lock().expect("poisoned")
	}

	/// pushes tried, failed ones included
	pub fn attempts(&self) -> usize {
		*self.0.attempts.lock().expect("poisoned")
	}
}

fn not_found(what: &str) -> RequestError {
	RequestError::Fetch(reqwest::StatusCode::NOT_FOUND, format!("{what} not found"))
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
	async fn pull_actor(&self, url: &str, _signed: bool) -> Result<Actor, RequestError> {
		*self.0.actor_fetches.lock().expect("poisoned") += 1;
		self.0.actors.lock().expect("poisoned").get(url).cloned().ok_or_else(|| not_found(url))
	}

	async fn pull_instance(&self, domain: &str) -> Result<SubscriptionInfo, RequestError> {
		self.0.instances.lock().expect("poisoned").get(domain).cloned().ok_or_else(|| not_found(domain))
	}

	async fn push(&self, inbox: &str, payload: &str) -> Result<(), RequestError> {
		*self.0.attempts.lock().expect("poisoned") += 1;
		let domain = crate::ext::domain_of(inbox);
		if self.0.unreachable.lock().expect("poisoned").contains(&domain) {
			return Err(RequestError::Fetch(reqwest::StatusCode::BAD_GATEWAY, "unreachable".into()));
		}
		self.0.pushed.lock().expect("poisoned").push((inbox.to_string(), payload.to_string()));
		Ok(())
	}
}

/// a relay on `relay.example`, backed by memory and a mock fetcher
pub struct TestRelay {
	pub ctx: Context,
	pub fetcher: MockFetcher,
	pub jobs: JobReceiver,
}

pub async fn relay(config: Config) -> TestRelay {
	relay_as(config, Role::Server).await
}

pub async fn relay_as(config: Config, role: Role) -> TestRelay {
	let fetcher = MockFetcher::default();
	let (queue, jobs) = Queue::new(1024);
	let ctx = Context::with_fetcher(
		config,
		"https://relay.example".to_string(),
		Arc::new(MemoryStore::default()),
		keypair().0.clone(),
		queue,
		role,
		Box::new(fetcher.clone()),
	)
		.await
		.expect("failed creating test context");
	TestRelay { ctx, fetcher, jobs }
}

impl TestRelay {
	/// known remote instance with an actor of given type
	pub fn remote(&self, domain: &str, software: &str, users: u64) -> Actor {
		let actor = remote_actor(domain, "Application");
		self.fetcher.add_actor(actor.clone());
		self.fetcher.add_instance(info(domain, software, users));
		actor
	}

	/// remote person actor, registered in the fetcher
	pub fn person(&self, domain: &str) -> Actor {
		let mut actor = remote_actor(domain, "Person");
		actor.id = format!("https://{domain}/users/alice");
		self.fetcher.add_actor(actor.clone());
		actor
	}

	/// existing subscriber, no deliveries involved
	pub async fn subscribe(&self, domain: &str, software: &str) {
		self.remote(domain, software, 100);
		self.ctx.state().set_info(&info(domain, software, 100)).await.expect("store failed");
		self.ctx.state().add_subscription(&subscription(domain)).await.expect("store failed");
	}
}

pub fn remote_actor(domain: &str, kind: &str) -> Actor {
	let id = format!("https://{domain}/actor");
	Actor {
		actor_type: kind.to_string(),
		preferred_username: "relay".to_string(),
		inbox: format!("{id}/inbox"),
		endpoints: Some(crate::model::actor::Endpoints { shared_inbox: Some(format!("https://{domain}/inbox")) }),
		public_key: PublicKey {
			id: format!("{id}#main-key"),
			owner: id.clone(),
			public_key_pem: keypair().1.clone(),
		},
		id,
		..Default::default()
	}
}

pub fn info(domain: &str, software: &str, users: u64) -> SubscriptionInfo {
	SubscriptionInfo {
		domain: domain.to_string(),
		software: software.to_string(),
		version: "1.0.0".to_string(),
		total_user: users,
		active_user: users,
		post: users * 10,
		retry: 0,
	}
}

pub fn subscription(domain: &str) -> Subscription {
	Subscription {
		domain: domain.to_string(),
		inbox_url: format!("https://{domain}/inbox"),
		activity_id: format!("https://{domain}/follows/relay"),
		actor_id: format!("https://{domain}/actor"),
	}
}

pub fn pending(domain: &str) -> PendingFollow {
	PendingFollow {
		domain: domain.to_string(),
		inbox_url: format!("https://{domain}/inbox"),
		activity_id: format!("https://{domain}/follows/relay"),
		activity_type: "Follow".to_string(),
		actor: format!("https://{domain}/actor"),
		object: PUBLIC.to_string(),
		retry: 0,
	}
}

pub fn follow(domain: &str) -> Activity {
	Activity {
		context: serde_json::Value::String(crate::model::activity::ACTIVITY_STREAMS.to_string()),
		id: format!("https://{domain}/follows/relay"),
		actor: format!("https://{domain}/actor"),
		activity_type: "Follow".to_string(),
		object: serde_json::Value::String(PUBLIC.to_string()),
		..Default::default()
	}
}

pub fn undo(activity: &Activity) -> Activity {
	Activity {
		id: format!("{}/undo", activity.id),
		actor: activity.actor.clone(),
		activity_type: "Undo".to_string(),
		object: serde_json::to_value(activity).expect("activity serializes"),
		..Default::default()
	}
}

/// headers of a request signed with the shared test key
pub fn signed_headers(key_id: &str, method: &str, target: &str, body: &str) -> BTreeMap<String, String> {
	let mut headers : BTreeMap<String, String> = [
		("host".to_string(), "relay.example".to_string()),
		("date".to_string(), chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()),
		("digest".to_string(), httpsign::digest(body)),
		("content-type".to_string(), "application/activity+json".to_string()),
	].into();
	let mut signer = httpsign::HttpSignature::new(key_id.to_string(), "rsa-sha256".to_string(), &httpsign::SIGNED_HEADERS);
	signer
		.build_manually(method, target, &headers)
		.sign(&keypair().0)
		.expect("failed signing test request");
	headers.insert("signature".to_string(), signer.header());
	headers
}

/// every job currently waiting in queue
pub fn drain(jobs: &mut JobReceiver) -> Vec<Job> {
	let mut out = Vec::new();
	while let Ok(job) = jobs.try_recv() {
		out.push(job);
	}
	out
}

pub fn activity_type(job: &Job) -> String {
	serde_json::from_str::<Activity>(&job.payload)
		.map(|a| a.activity_type)
		.unwrap_or_default()
}
