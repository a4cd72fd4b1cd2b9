use crate::{
	model::{Activity, PendingKind, Subscription, SubscriptionInfo},
	store::StoreResult,
	Context,
};

/// subscriber lifecycle operations, shared by inbox, background loops and admin cli
#[async_trait::async_trait]
pub trait Membership {
	/// make domain a subscriber answering its Follow, following back when its software expects it
	async fn admit(&self, sub: &Subscription, follow: &Activity, info: Option<&SubscriptionInfo>) -> StoreResult<()>;

	/// answer a Follow with a Reject, nothing is stored
	fn refuse(&self, inbox: &str, follow: &Activity);

	/// accept a stored follow request, false if there was none
	async fn accept_pending(&self, kind: PendingKind, domain: &str, info: Option<&SubscriptionInfo>) -> StoreResult<bool>;

	/// reject a stored follow request and forget it, false if there was none
	async fn reject_pending(&self, kind: PendingKind, domain: &str) -> StoreResult<bool>;

	/// subscriber left on its own, false if it wasn't subscribed
	async fn unsubscribe(&self, domain: &str) -> StoreResult<bool>;

	/// relay decided to drop a subscriber, false if it wasn't subscribed
	async fn evict(&self, domain: &str, reason: &str) -> StoreResult<bool>;

	/// send an Update of the relay actor to every subscriber
	fn broadcast_actor(&self) -> usize;
}

#[async_trait::async_trait]
impl Membership for Context {
	async fn admit(&self, sub: &Subscription, follow: &Activity, info: Option<&SubscriptionInfo>) -> StoreResult<()> {
		if let Some(info) = info {
			self.state().set_info(info).await?;
		}
		self.state().add_subscription(sub).await?;
		self.deliver(&sub.inbox_url, &follow.response(self.base(), "Accept"));
		if info.is_some_and(SubscriptionInfo::wants_follow_back) {
			self.deliver(&sub.inbox_url, &Activity::follow_back(self.base(), &sub.domain, &sub.actor_id));
		}
		tracing::info!("accepted subscription from {}", sub.domain);
		Ok(())
	}

	fn refuse(&self, inbox: &str, follow: &Activity) {
		self.deliver(inbox, &follow.response(self.base(), "Reject"));
	}

	async fn accept_pending(&self, kind: PendingKind, domain: &str, info: Option<&SubscriptionInfo>) -> StoreResult<bool> {
		let Some(pending) = self.state().pending(kind, domain).await? else {
			return Ok(false);
		};
		self.admit(&pending.subscription(), &pending.follow(), info).await?;
		Ok(true)
	}

	async fn reject_pending(&self, kind: PendingKind, domain: &str) -> StoreResult<bool> {
		let Some(pending) = self.state().pending(kind, domain).await? else {
			return Ok(false);
		};
		self.refuse(&pending.inbox_url, &pending.follow());
		self.state().del_pending(kind, domain).await?;
		tracing::info!("rejected follow request from {domain}");
		Ok(true)
	}

	async fn unsubscribe(&self, domain: &str) -> StoreResult<bool> {
		let Some(sub) = self.state().select_subscription(domain).await? else {
			return Ok(false);
		};
		let info = self.state().info(domain).await?;
		self.state().del_subscription(domain).await?;
		if info.as_ref().is_some_and(SubscriptionInfo::wants_follow_back) {
			self.deliver(&sub.inbox_url, &Activity::undo_follow_back(self.base(), domain, &sub.actor_id));
		}
		self.state().del_info(domain).await?;
		tracing::info!("{domain} unsubscribed");
		Ok(true)
	}

	async fn evict(&self, domain: &str, reason: &str) -> StoreResult<bool> {
		let Some(sub) = self.state().select_subscription(domain).await? else {
			self.state().del_info(domain).await?;
			return Ok(false);
		};
		tracing::info!("evicting {domain}: {reason}");
		self.refuse(&sub.inbox_url, &sub.follow());
		self.unsubscribe(domain).await
	}

	fn broadcast_actor(&self) -> usize {
		let actor = match serde_json::to_value(self.actor()) {
			Ok(x) => x,
			Err(e) => {
				tracing::error!("could not serialize relay actor: {e}");
				return 0;
			},
		};
		let update = Activity::update(self.base(), actor);
		let subscriptions = self.state().subscriptions();
		for sub in subscriptions.iter() {
			self.deliver(&sub.inbox_url, &update);
		}
		subscriptions.len()
	}
}

#[cfg(test)]
mod test {
	use crate::{model::PendingKind, queue::JobKind, testing};

	use super::Membership;

	#[tokio::test]
	async fn eviction_rejects_and_undoes_follow_back() {
		let mut relay = testing::relay(Default::default()).await;
		relay.subscribe("pleroma.example", "pleroma").await;
		testing::drain(&mut relay.jobs);

		assert!(relay.ctx.evict("pleroma.example", "too big").await.unwrap());

		let jobs = testing::drain(&mut relay.jobs);
		let kinds : Vec<String> = jobs.iter().map(testing::activity_type).collect();
		assert_eq!(kinds, vec!["Reject".to_string(), "Undo".to_string()]);
		assert!(jobs.iter().all(|j| j.kind == JobKind::Registor));
		assert!(!relay.ctx.state().subscriptions().contains("pleroma.example"));
		assert!(relay.ctx.state().info("pleroma.example").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn mastodon_gets_no_undo_back() {
		let mut relay = testing::relay(Default::default()).await;
		relay.subscribe("mastodon.example", "mastodon").await;
		testing::drain(&mut relay.jobs);

		assert!(relay.ctx.unsubscribe("mastodon.example").await.unwrap());
		assert!(testing::drain(&mut relay.jobs).is_empty());
		assert!(!relay.ctx.unsubscribe("mastodon.example").await.unwrap());
	}

	#[tokio::test]
	async fn pending_requests_can_be_decided() {
		let mut relay = testing::relay(Default::default()).await;
		relay.ctx.state().set_pending(PendingKind::Manual, &testing::pending("a.example")).await.unwrap();
		relay.ctx.state().set_pending(PendingKind::Manual, &testing::pending("b.example")).await.unwrap();

		assert!(relay.ctx.accept_pending(PendingKind::Manual, "a.example", None).await.unwrap());
		assert!(relay.ctx.reject_pending(PendingKind::Manual, "b.example").await.unwrap());
		assert!(!relay.ctx.reject_pending(PendingKind::Manual, "c.example").await.unwrap());

		let kinds : Vec<String> = testing::drain(&mut relay.jobs).iter().map(testing::activity_type).collect();
		assert_eq!(kinds, vec!["Accept".to_string(), "Reject".to_string()]);
		assert!(relay.ctx.state().subscriptions().contains("a.example"));
		assert!(relay.ctx.state().pending_domains(PendingKind::Manual).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn actor_update_reaches_every_subscriber() {
		let mut relay = testing::relay(Default::default()).await;
		relay.subscribe("a.example", "mastodon").await;
		relay.subscribe("b.example", "mastodon").await;
		testing::drain(&mut relay.jobs);

		assert_eq!(relay.ctx.broadcast_actor(), 2);
		let jobs = testing::drain(&mut relay.jobs);
		assert_eq!(jobs.len(), 2);
		assert!(jobs.iter().all(|j| testing::activity_type(j) == "Update"));
	}
}
