use std::collections::BTreeMap;

use futures::stream::BoxStream;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("redis error: {0}")]
	Redis(#[from] ::redis::RedisError),

	#[error("stored value is malformed: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("unsupported store uri '{0}'")]
	UnsupportedUri(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// key-value and hash operations the relay needs from its backing store
#[async_trait::async_trait]
pub trait Store: Sync + Send {
	async fn get(&self, key: &str) -> StoreResult<Option<String>>;
	async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
	async fn del(&self, key: &str) -> StoreResult<()>;
	/// all keys starting with given prefix
	async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
	async fn expire(&self, key: &str, seconds: i64) -> StoreResult<()>;

	async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
	async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>>;
	async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;
	async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;
	/// returns false if field was already present
	async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;
	async fn hdel(&self, key: &str, field: &str) -> StoreResult<()>;
	async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;

	async fn publish(&self, channel: &str, message: &str) -> StoreResult<()>;
	async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>>;
}

/// open a store from its connection uri
pub async fn connect(uri: &str) -> StoreResult<std::sync::Arc<dyn Store>> {
	if uri.starts_with("redis://") || uri.starts_with("rediss://") || uri.starts_with("unix://") {
		Ok(std::sync::Arc::new(RedisStore::connect(uri).await?))
	} else if uri.starts_with("memory://") {
		tracing::warn!("using volatile in-memory store, state will be lost on restart");
		Ok(std::sync::Arc::new(MemoryStore::default()))
	} else {
		Err(StoreError::UnsupportedUri(uri.to_string()))
	}
}
