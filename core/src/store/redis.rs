use std::collections::BTreeMap;

use futures::{stream::BoxStream, StreamExt};
use redis::{aio::ConnectionManager, AsyncCommands};

use super::{Store, StoreResult};

pub struct RedisStore {
	client: redis::Client,
	conn: ConnectionManager,
}

impl RedisStore {
	pub async fn connect(uri: &str) -> StoreResult<Self> {
		let client = redis::Client::open(uri)?;
		let conn = ConnectionManager::new(client.clone()).await?;
		tracing::info!("connected to redis store");
		Ok(RedisStore { client, conn })
	}

	// the manager multiplexes and reconnects, cloning it is cheap
	fn conn(&self) -> ConnectionManager {
		self.conn.clone()
	}
}

#[async_trait::async_trait]
impl Store for RedisStore {
	async fn get(&self, key: &str) -> StoreResult<Option<String>> {
		let value: Option<String> = self.conn().get(key).await?;
		Ok(value)
	}

	async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
		let _: () = self.conn().set(key, value).await?;
		Ok(())
	}

	async fn del(&self, key: &str) -> StoreResult<()> {
		let _: i64 = self.conn().del(key).await?;
		Ok(())
	}

	async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
		let keys: Vec<String> = self.conn().keys(format!("{prefix}*")).await?;
		Ok(keys)
	}

	async fn expire(&self, key: &str, seconds: i64) -> StoreResult<()> {
		let _: i64 = self.conn().expire(key, seconds).await?;
		Ok(())
	}

	async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
		let value: Option<String> = self.conn().hget(key, field).await?;
		Ok(value)
	}

	async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
		let values: BTreeMap<String, String> = self.conn().hgetall(key).await?;
		Ok(values)
	}

	async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
		let _: i64 = self.conn().hset(key, field, value).await?;
		Ok(())
	}

	async fn hset_many(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
		let _: () = self.conn().hset_multiple(key, fields).await?;
		Ok(())
	}

	async fn hset_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
		let set: bool = self.conn().hset_nx(key, field, value).await?;
		Ok(set)
	}

	async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
		let _: i64 = self.conn().hdel(key, field).await?;
		Ok(())
	}

	async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
		let fields: Vec<String> = self.conn().hkeys(key).await?;
		Ok(fields)
	}

	async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
		let _: i64 = self.conn().publish(channel, message).await?;
		Ok(())
	}

	async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>> {
		let mut pubsub = self.client.get_async_pubsub().await?;
		pubsub.subscribe(channel).await?;
		Ok(
			pubsub
				.into_on_message()
				.filter_map(|msg| async move { msg.get_payload::<String>().ok() })
				.boxed()
		)
	}
}
