use std::collections::BTreeMap;

use httpsign::{HttpSignature, HttpSignatureError};

use crate::{model::{Activity, Actor}, traits::RequestError, Context};

/// raw inbound request, header names lowercase
pub struct SignedRequest<'a> {
	pub method: &'a str,
	pub target: &'a str,
	pub headers: BTreeMap<String, String>,
	pub body: &'a [u8],
}

/// authenticated activity with the actor that sent it
#[derive(Debug, Clone)]
pub struct Inbound {
	pub activity: Activity,
	pub actor: Actor,
	/// original payload, forwarded untouched
	pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	#[error("request carries no http signature")]
	MissingSignature,

	#[error("http signature does not match")]
	SignatureInvalid,

	#[error("malformed http signature: {0}")]
	SignatureMalformed(#[from] HttpSignatureError),

	#[error("payload digest does not match")]
	DigestMismatch,

	#[error("could not resolve signing key: {0}")]
	KeyUnresolvable(RequestError),

	#[error("could not resolve activity actor: {0}")]
	ActorUnresolvable(RequestError),

	#[error("malformed activity: {0}")]
	Malformed(#[from] serde_json::Error),

	#[error("activity from {actor} signed with a key of {key_owner}")]
	KeyMismatch { key_owner: String, actor: String },

	#[error("actor document at {actor} claims id {claimed}")]
	ActorMismatch { actor: String, claimed: String },
}

impl Context {
	/// verify signature and digest, decode the activity and resolve its actor
	pub async fn authenticate(&self, req: SignedRequest<'_>) -> Result<Inbound, AuthError> {
		let key_owner = if self.cfg().security.authorized_fetch {
			None
		} else {
			Some(self.verify_signature(&req).await?)
		};

		let body = String::from_utf8_lossy(req.body).to_string();
		let activity : Activity = serde_json::from_str(&body)?;

		if let Some(key_owner) = key_owner {
			if Context::server(&key_owner) != Context::server(&activity.actor) {
				return Err(AuthError::KeyMismatch { key_owner, actor: activity.actor });
			}
		}

		let actor = self.resolve_actor(&activity.actor)
			.await
			.map_err(AuthError::ActorUnresolvable)?;

		if actor.id != activity.actor {
			return Err(AuthError::ActorMismatch { actor: activity.actor, claimed: actor.id });
		}

		Ok(Inbound { activity, actor, body })
	}

	/// owner of the key the request was signed with
	async fn verify_signature(&self, req: &SignedRequest<'_>) -> Result<String, AuthError> {
		let digest = req.headers.get("digest").ok_or(AuthError::DigestMismatch)?;
		if !httpsign::verify_digest(digest, req.body) {
			return Err(AuthError::DigestMismatch);
		}

		let header = req.headers.get("signature").ok_or(AuthError::MissingSignature)?;
		let mut signature = HttpSignature::parse(header)?;

		let signer = self.resolve_actor(signature.key_owner())
			.await
			.map_err(AuthError::KeyUnresolvable)?;

		signature.build_manually(req.method, req.target, &req.headers);

		if !signature.verify(&signer.public_key.public_key_pem)? {
			tracing::debug!("signature from {} does not verify", signature.key_id);
			return Err(AuthError::SignatureInvalid);
		}

		Ok(signature.key_owner().to_string())
	}
}

#[cfg(test)]
mod test {
	use crate::testing;

	use super::{AuthError, SignedRequest};

	#[tokio::test]
	async fn signed_request_authenticates() {
		let relay = testing::relay(Default::default()).await;
		let actor = relay.remote("a.example", "mastodon", 10);
		let body = serde_json::to_string(&testing::follow("a.example")).unwrap();
		let headers = testing::signed_headers(&actor.public_key.id, "post", "/inbox", &body);

		let inbound = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/inbox", headers, body: body.as_bytes(),
		}).await.unwrap();

		assert_eq!(inbound.actor.id, "https://a.example/actor");
		assert_eq!(inbound.activity.activity_type, "Follow");
		assert_eq!(inbound.body, body);
		// key owner and activity actor are the same document
		assert_eq!(relay.fetcher.actor_fetches(), 1);
	}

	#[tokio::test]
	async fn tampered_body_fails_digest() {
		let relay = testing::relay(Default::default()).await;
		let actor = relay.remote("a.example", "mastodon", 10);
		let body = serde_json::to_string(&testing::follow("a.example")).unwrap();
		let headers = testing::signed_headers(&actor.public_key.id, "post", "/inbox", &body);

		let res = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/inbox", headers, body: b"{\"type\":\"Delete\"}",
		}).await;

		assert!(matches!(res, Err(AuthError::DigestMismatch)));
	}

	#[tokio::test]
	async fn wrong_target_fails_signature() {
		let relay = testing::relay(Default::default()).await;
		let actor = relay.remote("a.example", "mastodon", 10);
		let body = serde_json::to_string(&testing::follow("a.example")).unwrap();
		let headers = testing::signed_headers(&actor.public_key.id, "post", "/inbox", &body);

		let res = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/actor/inbox", headers, body: body.as_bytes(),
		}).await;

		assert!(matches!(res, Err(AuthError::SignatureInvalid)));
	}

	#[tokio::test]
	async fn unknown_key_is_unresolvable() {
		let relay = testing::relay(Default::default()).await;
		let body = serde_json::to_string(&testing::follow("ghost.example")).unwrap();
		let headers = testing::signed_headers("https://ghost.example/actor#main-key", "post", "/inbox", &body);

		let res = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/inbox", headers, body: body.as_bytes(),
		}).await;

		assert!(matches!(res, Err(AuthError::KeyUnresolvable(_))));
	}

	#[tokio::test]
	async fn foreign_key_cannot_sign_for_actor() {
		let relay = testing::relay(Default::default()).await;
		relay.remote("victim.example", "mastodon", 10);
		let evil = relay.remote("evil.example", "mastodon", 10);
		let body = serde_json::to_string(&testing::undo(&testing::follow("victim.example"))).unwrap();
		let headers = testing::signed_headers(&evil.public_key.id, "post", "/inbox", &body);

		let res = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/inbox", headers, body: body.as_bytes(),
		}).await;

		assert!(matches!(res, Err(AuthError::KeyMismatch { .. })));
	}

	#[tokio::test]
	async fn actor_document_must_match_its_url() {
		let relay = testing::relay(Default::default()).await;
		let victim = relay.remote("victim.example", "mastodon", 10);
		relay.fetcher.add_actor_at("https://evil.example/actor", victim);
		let body = serde_json::to_string(&testing::follow("evil.example")).unwrap();
		let headers = testing::signed_headers("https://evil.example/actor#main-key", "post", "/inbox", &body);

		let res = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/inbox", headers, body: body.as_bytes(),
		}).await;

		assert!(matches!(res, Err(AuthError::ActorMismatch { .. })));
	}

	#[tokio::test]
	async fn authorized_fetch_skips_verification() {
		let mut config = crate::Config::default();
		config.security.authorized_fetch = true;
		let relay = testing::relay(config).await;
		relay.remote("a.example", "mastodon", 10);
		let body = serde_json::to_string(&testing::follow("a.example")).unwrap();

		let inbound = relay.ctx.authenticate(SignedRequest {
			method: "POST", target: "/inbox", headers: Default::default(), body: body.as_bytes(),
		}).await.unwrap();

		assert_eq!(inbound.actor.id, "https://a.example/actor");
	}
}
