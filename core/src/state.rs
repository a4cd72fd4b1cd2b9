use std::{collections::{BTreeMap, BTreeSet}, sync::{Arc, RwLock}};

use crate::{model::{PendingFollow, PendingKind, RelayToggles, Subscription, SubscriptionInfo, Toggle}, store::{Store, StoreResult}};

pub const NOTIFY_CHANNEL: &str = "relay_refresh";
pub const NOTIFY_REFRESH: &str = "refresh";
pub const NOTIFY_RELOAD: &str = "reload";

const SUBSCRIPTION_PREFIX: &str = "relay:subscription:";
const PENDING_PREFIX: &str = "relay:pending:";
const AUTOPENDING_PREFIX: &str = "relay:autopending:";
const STATISTICS_PREFIX: &str = "relay:statistics:";
const INFO_KEY: &str = "relay:info";
const LIMITED_KEY: &str = "relay:config:limitedDomain";
const BLOCKED_KEY: &str = "relay:config:blockedDomain";

/// how long delivery error markers are kept
const ERROR_MARKER_SECONDS: i64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet(BTreeSet<String>);

impl DomainSet {
	pub fn contains(&self, domain: &str) -> bool {
		self.0.contains(domain)
	}

	pub fn iter(&self) -> impl Iterator<Item = &String> {
		self.0.iter()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	fn set(&mut self, domain: &str, present: bool) {
		if present {
			self.0.insert(domain.to_string());
		} else {
			self.0.remove(domain);
		}
	}
}

impl FromIterator<String> for DomainSet {
	fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
		DomainSet(iter.into_iter().collect())
	}
}

/// current subscribers, ordered by domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions(BTreeMap<String, Subscription>);

impl Subscriptions {
	pub fn contains(&self, domain: &str) -> bool {
		self.0.contains_key(domain)
	}

	pub fn get(&self, domain: &str) -> Option<&Subscription> {
		self.0.get(domain)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
		self.0.values()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	fn insert(&mut self, sub: Subscription) {
		self.0.insert(sub.domain.clone(), sub);
	}

	fn remove(&mut self, domain: &str) {
		self.0.remove(domain);
	}
}

impl FromIterator<Subscription> for Subscriptions {
	fn from_iter<T: IntoIterator<Item = Subscription>>(iter: T) -> Self {
		Subscriptions(iter.into_iter().map(|s| (s.domain.clone(), s)).collect())
	}
}

/// in-memory view of the store, refreshed on change notifications
#[derive(Debug, Clone, Default)]
pub struct Mirror {
	pub toggles: RelayToggles,
	pub limited: DomainSet,
	pub blocked: DomainSet,
	pub subscriptions: Subscriptions,
}

/// full dump of relay state, used by export and import
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RelayDump {
	#[serde(default)]
	pub relay_config: RelayToggles,
	#[serde(default)]
	pub limited_domains: Vec<String>,
	#[serde(default)]
	pub blocked_domains: Vec<String>,
	#[serde(default)]
	pub subscriptions: Vec<Subscription>,
}

/// typed access to relay state held in the store
#[derive(Clone)]
pub struct RelayState {
	store: Arc<dyn Store>,
	mirror: Arc<RwLock<Arc<Mirror>>>,
}

fn pending_prefix(kind: PendingKind) -> &'static str {
	match kind {
		PendingKind::Manual => PENDING_PREFIX,
		PendingKind::Auto => AUTOPENDING_PREFIX,
	}
}

impl RelayState {
	pub fn new(store: Arc<dyn Store>) -> Self {
		RelayState { store, mirror: Arc::new(RwLock::new(Arc::new(Mirror::default()))) }
	}

	pub fn store(&self) -> &dyn Store {
		self.store.as_ref()
	}

	/// snapshot of the last loaded state
	pub fn mirror(&self) -> Arc<Mirror> {
		match self.mirror.read() {
			Ok(x) => x.clone(),
			Err(e) => e.into_inner().clone(),
		}
	}

	pub fn subscriptions(&self) -> Subscriptions {
		self.mirror().subscriptions.clone()
	}

	pub fn toggles(&self) -> RelayToggles {
		self.mirror().toggles
	}

	pub fn limited_domains(&self) -> DomainSet {
		self.mirror().limited.clone()
	}

	pub fn blocked_domains(&self) -> DomainSet {
		self.mirror().blocked.clone()
	}

	/// reload mirror from the store
	pub async fn load(&self) -> StoreResult<()> {
		let mut toggles = RelayToggles::default();
		for toggle in Toggle::ALL {
			let value = self.store.get(toggle.key()).await?;
			toggles.set(toggle, value.as_deref() == Some("1"));
		}

		let limited = self.store.hkeys(LIMITED_KEY).await?.into_iter().collect();
		let blocked = self.store.hkeys(BLOCKED_KEY).await?.into_iter().collect();

		let mut subscriptions = Vec::new();
		for key in self.store.keys(SUBSCRIPTION_PREFIX).await? {
			let domain = key.trim_start_matches(SUBSCRIPTION_PREFIX).to_string();
			if let Some(sub) = self.fetch_subscription(&domain).await? {
				subscriptions.push(sub);
			}
		}

		let mirror = Mirror {
			toggles, limited, blocked,
			subscriptions: subscriptions.into_iter().collect(),
		};

		match self.mirror.write() {
			Ok(mut x) => *x = Arc::new(mirror),
			Err(e) => *e.into_inner() = Arc::new(mirror),
		}

		Ok(())
	}

	/// apply a single change to the local mirror and tell other processes to reload
	async fn refresh(&self, change: impl FnOnce(&mut Mirror) + Send) -> StoreResult<()> {
		{
			let mut guard = match self.mirror.write() {
				Ok(x) => x,
				Err(e) => e.into_inner(),
			};
			let mut mirror = Mirror::clone(&guard);
			change(&mut mirror);
			*guard = Arc::new(mirror);
		}
		self.store.publish(NOTIFY_CHANNEL, NOTIFY_REFRESH).await
	}

	/// ask running relay processes to reload domain rule files
	pub async fn request_reload(&self) -> StoreResult<()> {
		self.store.publish(NOTIFY_CHANNEL, NOTIFY_RELOAD).await
	}

	async fn fetch_subscription(&self, domain: &str) -> StoreResult<Option<Subscription>> {
		let fields = self.store.hgetall(&format!("{SUBSCRIPTION_PREFIX}{domain}")).await?;
		if fields.is_empty() {
			return Ok(None);
		}
		let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
		Ok(Some(Subscription {
			domain: domain.to_string(),
			inbox_url: get("inbox_url"),
			activity_id: get("activity_id"),
			actor_id: get("actor_id"),
		}))
	}

	/// subscription as currently persisted, bypassing the mirror
	pub async fn select_subscription(&self, domain: &str) -> StoreResult<Option<Subscription>> {
		self.fetch_subscription(domain).await
	}

	/// persist a subscription, withdrawing any pending request for the same domain
	pub async fn add_subscription(&self, sub: &Subscription) -> StoreResult<()> {
		self.store.hset_many(
			&format!("{SUBSCRIPTION_PREFIX}{}", sub.domain),
			&[
				("inbox_url", sub.inbox_url.clone()),
				("activity_id", sub.activity_id.clone()),
				("actor_id", sub.actor_id.clone()),
			],
		).await?;
		self.store.del(&format!("{PENDING_PREFIX}{}", sub.domain)).await?;
		self.store.del(&format!("{AUTOPENDING_PREFIX}{}", sub.domain)).await?;
		let sub = sub.clone();
		self.refresh(move |m| m.subscriptions.insert(sub)).await
	}

	/// drop a subscription together with any pending request for the domain
	pub async fn del_subscription(&self, domain: &str) -> StoreResult<()> {
		self.store.del(&format!("{SUBSCRIPTION_PREFIX}{domain}")).await?;
		self.store.del(&format!("{PENDING_PREFIX}{domain}")).await?;
		self.store.del(&format!("{AUTOPENDING_PREFIX}{domain}")).await?;
		self.refresh(|m| m.subscriptions.remove(domain)).await
	}

	/// store a follow request, replacing a request of the other kind for the same domain
	pub async fn set_pending(&self, kind: PendingKind, pending: &PendingFollow) -> StoreResult<()> {
		let mut fields = vec![
			("inbox_url", pending.inbox_url.clone()),
			("activity_id", pending.activity_id.clone()),
			("type", pending.activity_type.clone()),
			("actor", pending.actor.clone()),
			("object", pending.object.clone()),
		];
		if kind == PendingKind::Auto {
			fields.push(("retry", pending.retry.to_string()));
		}
		let other = match kind {
			PendingKind::Manual => PendingKind::Auto,
			PendingKind::Auto => PendingKind::Manual,
		};
		self.store.del(&format!("{}{}", pending_prefix(other), pending.domain)).await?;
		self.store.hset_many(&format!("{}{}", pending_prefix(kind), pending.domain), &fields).await
	}

	pub async fn pending(&self, kind: PendingKind, domain: &str) -> StoreResult<Option<PendingFollow>> {
		let fields = self.store.hgetall(&format!("{}{domain}", pending_prefix(kind))).await?;
		if fields.is_empty() {
			return Ok(None);
		}
		let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
		Ok(Some(PendingFollow {
			domain: domain.to_string(),
			inbox_url: get("inbox_url"),
			activity_id: get("activity_id"),
			activity_type: get("type"),
			actor: get("actor"),
			object: get("object"),
			retry: get("retry").parse().unwrap_or_default(),
		}))
	}

	pub async fn pending_domains(&self, kind: PendingKind) -> StoreResult<Vec<String>> {
		let prefix = pending_prefix(kind);
		Ok(
			self.store.keys(prefix)
				.await?
				.into_iter()
				.map(|k| k.trim_start_matches(prefix).to_string())
				.collect()
		)
	}

	pub async fn del_pending(&self, kind: PendingKind, domain: &str) -> StoreResult<()> {
		self.store.del(&format!("{}{domain}", pending_prefix(kind))).await
	}

	pub async fn info(&self, domain: &str) -> StoreResult<Option<SubscriptionInfo>> {
		match self.store.hget(INFO_KEY, domain).await? {
			None => Ok(None),
			Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
		}
	}

	pub async fn set_info(&self, info: &SubscriptionInfo) -> StoreResult<()> {
		self.store.hset(INFO_KEY, &info.domain, &serde_json::to_string(info)?).await
	}

	pub async fn del_info(&self, domain: &str) -> StoreResult<()> {
		self.store.hdel(INFO_KEY, domain).await
	}

	pub async fn info_domains(&self) -> StoreResult<Vec<String>> {
		self.store.hkeys(INFO_KEY).await
	}

	pub async fn set_toggle(&self, toggle: Toggle, value: bool) -> StoreResult<()> {
		self.store.set(toggle.key(), if value { "1" } else { "0" }).await?;
		self.refresh(|m| m.toggles.set(toggle, value)).await
	}

	pub async fn set_limited(&self, domain: &str, limited: bool) -> StoreResult<()> {
		if limited {
			self.store.hset(LIMITED_KEY, domain, "1").await?;
		} else {
			self.store.hdel(LIMITED_KEY, domain).await?;
		}
		self.refresh(|m| m.limited.set(domain, limited)).await
	}

	pub async fn set_blocked(&self, domain: &str, blocked: bool) -> StoreResult<()> {
		if blocked {
			self.store.hset(BLOCKED_KEY, domain, "1").await?;
		} else {
			self.store.hdel(BLOCKED_KEY, domain).await?;
		}
		self.refresh(|m| m.blocked.set(domain, blocked)).await
	}

	/// remember last delivery failure towards a domain, first error wins until marker expires
	pub async fn mark_delivery_error(&self, domain: &str, error: &str) -> StoreResult<()> {
		let key = format!("{STATISTICS_PREFIX}{domain}");
		if self.store.hset_nx(&key, "last_error", error).await? {
			self.store.expire(&key, ERROR_MARKER_SECONDS).await?;
		}
		Ok(())
	}

	pub async fn delivery_error(&self, domain: &str) -> StoreResult<Option<String>> {
		self.store.hget(&format!("{STATISTICS_PREFIX}{domain}"), "last_error").await
	}

	pub async fn export(&self) -> StoreResult<RelayDump> {
		self.load().await?;
		let mirror = self.mirror();
		Ok(RelayDump {
			relay_config: mirror.toggles,
			limited_domains: mirror.limited.iter().cloned().collect(),
			blocked_domains: mirror.blocked.iter().cloned().collect(),
			subscriptions: mirror.subscriptions.iter().cloned().collect(),
		})
	}

	/// merge a dump into current state, existing entries are overwritten
	pub async fn import(&self, dump: &RelayDump) -> StoreResult<()> {
		for toggle in Toggle::ALL {
			self.store.set(toggle.key(), if dump.relay_config.get(toggle) { "1" } else { "0" }).await?;
		}
		for domain in &dump.limited_domains {
			self.store.hset(LIMITED_KEY, domain, "1").await?;
		}
		for domain in &dump.blocked_domains {
			self.store.hset(BLOCKED_KEY, domain, "1").await?;
		}
		for sub in &dump.subscriptions {
			self.store.hset_many(
				&format!("{SUBSCRIPTION_PREFIX}{}", sub.domain),
				&[
					("inbox_url", sub.inbox_url.clone()),
					("activity_id", sub.activity_id.clone()),
					("actor_id", sub.actor_id.clone()),
				],
			).await?;
		}
		self.load().await?;
		self.store.publish(NOTIFY_CHANNEL, NOTIFY_REFRESH).await
	}
}
