use std::{collections::BTreeMap, time::{Duration, Instant}};

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::{broadcast, Mutex};

use super::{Store, StoreResult};

#[derive(Default)]
struct Inner {
	strings: BTreeMap<String, String>,
	hashes: BTreeMap<String, BTreeMap<String, String>>,
	deadlines: BTreeMap<String, Instant>,
}

impl Inner {
	fn purge(&mut self) {
		let now = Instant::now();
		let expired : Vec<String> = self.deadlines
			.iter()
			.filter(|(_, deadline)| **deadline <= now)
			.map(|(k, _)| k.clone())
			.collect();
		for key in expired {
			self.remove(&key);
		}
	}

	fn remove(&mut self, key: &str) {
		self.strings.remove(key);
		self.hashes.remove(key);
		self.deadlines.remove(key);
	}
}

/// volatile store, for development and tests
pub struct MemoryStore {
	inner: Mutex<Inner>,
	bus: broadcast::Sender<(String, String)>,
}

impl Default for MemoryStore {
	fn default() -> Self {
		let (bus, _) = broadcast::channel(64);
		MemoryStore { inner: Mutex::new(Inner::default()), bus }
	}
}

#[async_trait::async_trait]
impl Store for MemoryStore {
	async fn get(&self, key: &str) -> StoreResult<Option<String>> {
		let mut inner = self.inner.lock().await;
		inner.purge();
		Ok(inner.strings.get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
		let mut inner = self.inner.lock().await;
		inner.remove(key);
		inner.strings.insert(key.to_string(), value.to_string());
		Ok(())
	}

	async fn del(&self, key: &str) -> StoreResult<()> {
		self.inner.lock().await.remove(key);
		Ok(())
	}

	async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
		let mut inner = self.inner.lock().await;
		inner.purge();
		Ok(
			inner.strings.keys()
				.chain(inner.hashes.keys())
				.filter(|k| k.starts_with(prefix))
				.cloned()
				.collect()
		)
	}

	async fn expire(&self, key: &str, seconds: i64) -> StoreResult<()> {
		let mut inner = self.inner.lock().await;
		if inner.strings.contains_key(key) || inner.hashes.contains_key(key) {
			let deadline = Instant::now() + Duration::from_secs(seconds.max(0) as u64);
			inner.deadlines.insert(key.to_string(), deadline);
		}
		Ok(())
	}

	async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
		let mut inner = self.inner.lock().await;
		inner.purge();
		Ok(inner.hashes.get(key).and_then(|h| h.get(field)).cloned())
	}

	async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
		let mut inner = self.inner.lock().await;
		inner.purge();
		Ok(inner.hashes.get(key).cloned().unwrap_or_default())
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
		self.inner.lock().await
			.hashes
			.entry(key.to_string())
			.or_default()
			.insert(field.to_string(), value.to_string());
		Ok(())
	}

	async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
		let mut inner = self.inner.lock().await;
		let hash = inner.hashes.entry(key.to_string()).or_default();
		for (field, value) in fields {
			hash.insert(field.to_string(), value.clone());
		}
		Ok(())
	}

	async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
		let mut inner = self.inner.lock().await;
		inner.purge();
		let hash = inner.hashes.entry(key.to_string()).or_default();
		if hash.contains_key(field) {
			return Ok(false);
		}
		hash.insert(field.to_string(), value.to_string());
		Ok(true)
	}

	async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
		let mut inner = self.inner.lock().await;
		if let Some(hash) = inner.hashes.get_mut(key) {
			hash.remove(field);
			if hash.is_empty() {
				inner.remove(key);
			}
		}
		Ok(())
	}

	async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
		let mut inner = self.inner.lock().await;
		inner.purge();
		Ok(inner.hashes.get(key).map(|h| h.keys().cloned().collect()).unwrap_or_default())
	}

	async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
		// nobody listening is fine
		let _ = self.bus.send((channel.to_string(), message.to_string()));
		Ok(())
	}

	async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>> {
		let channel = channel.to_string();
		let rx = self.bus.subscribe();
		Ok(
			futures::stream::unfold((rx, channel), |(mut rx, channel)| async move {
				loop {
					match rx.recv().await {
						Ok((chan, msg)) if chan == channel => return Some((msg, (rx, channel))),
						Ok(_) => continue,
						Err(broadcast::error::RecvError::Lagged(n)) => {
							tracing::warn!("notification listener lagged behind by {n} messages");
							continue;
						},
						Err(broadcast::error::RecvError::Closed) => return None,
					}
				}
			})
			.boxed()
		)
	}
}
