use crate::{
	auth::Inbound,
	membership::Membership,
	model::{activity::PUBLIC, Activity, ActivityType, PendingFollow, PendingKind, Subscription},
	policy::{self, Admission},
	store::StoreError,
	Context,
};

/// message for relay traffic coming from non subscribers
pub const NOT_SUBSCRIBED: &str = "To use the relay service, Subscribe me in advance";

/// outcome of an inbox delivery as seen by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	Accepted,
	Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
	#[error("store error: {0}")]
	Store(#[from] StoreError),

	#[error("could not serialize activity: {0}")]
	Json(#[from] serde_json::Error),
}

pub type DispatchResult = Result<Verdict, DispatchError>;

#[async_trait::async_trait]
pub trait Dispatcher {
	/// process an authenticated inbox activity
	async fn dispatch(&self, inbound: &Inbound, remote: &str) -> DispatchResult;
}

#[async_trait::async_trait]
impl Dispatcher for Context {
	async fn dispatch(&self, inbound: &Inbound, remote: &str) -> DispatchResult {
		let domain = Context::server(&inbound.activity.actor);
		tracing::debug!("{} from {domain} ({remote})", inbound.activity.activity_type);
		match inbound.activity.kind() {
			ActivityType::Follow => follow(self, inbound, &domain).await,
			ActivityType::Undo => match inbound.activity.nested() {
				Some(nested) if nested.kind() == ActivityType::Follow && nested.actor == inbound.activity.actor =>
					unfollow(self, &nested, &domain).await,
				_ => forward(self, inbound, &domain),
			},
			ActivityType::Announce => announce(self, inbound, &domain),
			ActivityType::Create | ActivityType::Update | ActivityType::Delete | ActivityType::Move =>
				forward(self, inbound, &domain),
			ActivityType::Accept | ActivityType::Reject => {
				tracing::info!("{domain} answered our follow with {}", inbound.activity.activity_type);
				Ok(Verdict::Accepted)
			},
			ActivityType::Other => Ok(Verdict::Rejected(format!("unsupported activity type '{}'", inbound.activity.activity_type))),
		}
	}
}

/// follows must target the public collection or the relay actor itself
fn follows_relay(ctx: &Context, follow: &Activity) -> bool {
	match follow.object_id() {
		Some(target) => target == PUBLIC
			|| target == "as:Public"
			|| target == "Public"
			|| target == ctx.actor().id
			|| target == ctx.base(),
		None => false,
	}
}

async fn follow(ctx: &Context, inbound: &Inbound, domain: &str) -> DispatchResult {
	let activity = &inbound.activity;
	let inbox = inbound.actor.delivery_inbox();

	if !follows_relay(ctx, activity) {
		tracing::info!("rejecting follow from {domain}: target is not the relay");
		ctx.refuse(inbox, activity);
		return Ok(Verdict::Accepted);
	}

	if ctx.state().blocked_domains().contains(domain) || !ctx.rules().permits(domain) {
		tracing::info!("rejecting follow from blocked domain {domain}");
		ctx.refuse(inbox, activity);
		return Ok(Verdict::Accepted);
	}

	let sub = Subscription {
		domain: domain.to_string(),
		inbox_url: inbox.to_string(),
		activity_id: activity.id.clone(),
		actor_id: activity.actor.clone(),
	};

	if ctx.state().subscriptions().contains(domain) {
		tracing::info!("{domain} followed again, confirming subscription");
		let info = ctx.state().info(domain).await?;
		ctx.admit(&sub, activity, info.as_ref()).await?;
		return Ok(Verdict::Accepted);
	}

	let pending = PendingFollow {
		domain: domain.to_string(),
		inbox_url: inbox.to_string(),
		activity_id: activity.id.clone(),
		activity_type: activity.activity_type.clone(),
		actor: activity.actor.clone(),
		object: activity.object_id().unwrap_or(PUBLIC).to_string(),
		retry: 0,
	};

	if ctx.state().toggles().manually_accept {
		tracing::info!("follow request from {domain} waits for manual approval");
		ctx.state().set_pending(PendingKind::Manual, &pending).await?;
		return Ok(Verdict::Accepted);
	}

	let info = match ctx.fetcher().pull_instance(domain).await {
		Ok(info) => Some(info),
		Err(e) => {
			tracing::warn!("could not fetch instance info of {domain}: {e}");
			None
		},
	};

	let subscribers = ctx.state().subscriptions().len();
	match policy::follow_admission(&ctx.rules(), &ctx.cfg().rules, domain, subscribers, info.as_ref()) {
		Admission::Admit => ctx.admit(&sub, activity, info.as_ref()).await?,
		Admission::Reject(reason) => {
			tracing::info!("rejecting follow from {domain}: {reason}");
			ctx.refuse(inbox, activity);
		},
		Admission::Pend => {
			tracing::info!("follow request from {domain} pending until its metadata is known");
			ctx.state().set_pending(PendingKind::Auto, &pending).await?;
		},
	}

	Ok(Verdict::Accepted)
}

async fn unfollow(ctx: &Context, follow: &Activity, domain: &str) -> DispatchResult {
	if !follows_relay(ctx, follow) {
		return Ok(Verdict::Rejected("Undo does not target a relay follow".to_string()));
	}

	if !ctx.unsubscribe(domain).await? {
		// nothing to undo, just withdraw whatever request was left
		ctx.state().del_pending(PendingKind::Manual, domain).await?;
		ctx.state().del_pending(PendingKind::Auto, domain).await?;
		tracing::debug!("ignoring unfollow from non subscriber {domain}");
	}

	Ok(Verdict::Accepted)
}

fn relay_acceptable(ctx: &Context, domain: &str) -> bool {
	ctx.state().subscriptions().contains(domain)
}

fn relay_allowed(ctx: &Context, inbound: &Inbound, domain: &str) -> bool {
	let mirror = ctx.state().mirror();
	policy::relay_filter(&mirror.limited, mirror.toggles.block_service, domain, &inbound.actor)
}

fn announce(ctx: &Context, inbound: &Inbound, domain: &str) -> DispatchResult {
	if !relay_acceptable(ctx, domain) {
		return Ok(Verdict::Rejected(NOT_SUBSCRIBED.to_string()));
	}

	if !relay_allowed(ctx, inbound, domain) {
		tracing::debug!("not relaying announce from {domain}");
		return Ok(Verdict::Accepted);
	}

	match (inbound.activity.is_reference(), inbound.activity.object_id()) {
		(true, Some(object)) => {
			let announce = Activity::announce(ctx.base(), object);
			ctx.relay(domain, &serde_json::to_string(&announce)?);
		},
		_ => tracing::debug!("skipping announce of embedded object from {domain}"),
	}

	Ok(Verdict::Accepted)
}

fn forward(ctx: &Context, inbound: &Inbound, domain: &str) -> DispatchResult {
	if !relay_acceptable(ctx, domain) {
		return Ok(Verdict::Rejected(NOT_SUBSCRIBED.to_string()));
	}

	if !relay_allowed(ctx, inbound, domain) {
		tracing::debug!("not relaying {} from {domain}", inbound.activity.activity_type);
		return Ok(Verdict::Accepted);
	}

	if inbound.activity.kind() == ActivityType::Create && ctx.state().toggles().create_as_announce {
		match inbound.activity.nested() {
			Some(note) if note.activity_type == "Note" && !note.id.is_empty() => {
				let announce = Activity::announce(ctx.base(), &note.id);
				ctx.relay(domain, &serde_json::to_string(&announce)?);
			},
			_ => tracing::debug!("dropping create of non-note from {domain}"),
		}
		return Ok(Verdict::Accepted);
	}

	ctx.relay(domain, &inbound.body);
	Ok(Verdict::Accepted)
}
