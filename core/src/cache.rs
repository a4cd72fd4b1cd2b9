use std::{collections::HashMap, sync::RwLock, time::{Duration, Instant}};

use crate::model::Actor;

/// remote actors fetched recently, keyed by actor url
pub struct ActorCache {
	ttl: Duration,
	entries: RwLock<HashMap<String, (Instant, Actor)>>,
}

impl ActorCache {
	pub fn new(ttl: Duration) -> Self {
		ActorCache { ttl, entries: RwLock::new(HashMap::new()) }
	}

	pub fn get(&self, url: &str) -> Option<Actor> {
		let entries = self.entries.read().ok()?;
		let (stored, actor) = entries.get(url)?;
		if stored.elapsed() >= self.ttl {
			return None;
		}
		Some(actor.clone())
	}

	pub fn insert(&self, url: &str, actor: Actor) {
		let Ok(mut entries) = self.entries.write() else {
			tracing::warn!("actor cache lock poisoned, not caching {url}");
			return;
		};
		let ttl = self.ttl;
		entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
		entries.insert(url.to_string(), (Instant::now(), actor));
	}

	pub fn len(&self) -> usize {
		self.entries.read().map(|e| e.len()).unwrap_or_default()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
