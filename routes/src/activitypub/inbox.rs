use axum::{extract::State, http::StatusCode};
use relay::{dispatch::{Dispatcher, Verdict}, Context};

use crate::{ApiError, ApiResult, AuthInbound};

pub async fn post(
	State(ctx): State<Context>,
	AuthInbound { inbound, remote }: AuthInbound,
) -> ApiResult<StatusCode> {
	match ctx.dispatch(&inbound, &remote).await? {
		Verdict::Accepted => Ok(StatusCode::ACCEPTED),
		Verdict::Rejected(reason) => Err(ApiError::Rejected(reason)),
	}
}

#[cfg(test)]
mod test {
	use axum::{body::Body, http::{Request, StatusCode}};
	use relay::{dispatch::NOT_SUBSCRIBED, model::Activity, testing};
	use tower::ServiceExt;

	async fn post(router: axum::Router, headers: &std::collections::BTreeMap<String, String>, body: &str) -> (StatusCode, String) {
		let mut req = Request::post("/inbox");
		for (k, v) in headers {
			req = req.header(k.as_str(), v.as_str());
		}
		let res = router
			.oneshot(req.body(Body::from(body.to_string())).unwrap())
			.await
			.unwrap();
		let status = res.status();
		let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
		(status, String::from_utf8_lossy(&body).to_string())
	}

	#[tokio::test]
	async fn signed_follow_is_accepted() {
		let mut relay = testing::relay(Default::default()).await;
		let actor = relay.remote("a.example", "mastodon", 100);
		let body = serde_json::to_string(&testing::follow("a.example")).unwrap();
		let headers = testing::signed_headers(&actor.public_key.id, "post", "/inbox", &body);

		let (status, _) = post(crate::router(relay.ctx.clone()), &headers, &body).await;

		assert_eq!(status, StatusCode::ACCEPTED);
		assert!(relay.ctx.state().subscriptions().contains("a.example"));
		let jobs = testing::drain(&mut relay.jobs);
		assert_eq!(testing::activity_type(&jobs[0]), "Accept");
	}

	#[tokio::test]
	async fn unsigned_requests_change_nothing() {
		let mut relay = testing::relay(Default::default()).await;
		relay.remote("a.example", "mastodon", 100);
		let body = serde_json::to_string(&testing::follow("a.example")).unwrap();
		let headers = [("content-type".to_string(), "application/activity+json".to_string())].into();

		let (status, body) = post(crate::router(relay.ctx.clone()), &headers, &body).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert!(body.is_empty());
		assert!(relay.ctx.state().subscriptions().is_empty());
		assert!(testing::drain(&mut relay.jobs).is_empty());
	}

	#[tokio::test]
	async fn garbage_is_a_bad_request() {
		let relay = testing::relay(Default::default()).await;
		let actor = relay.remote("a.example", "mastodon", 100);
		let body = "{ this is not json";
		let headers = testing::signed_headers(&actor.public_key.id, "post", "/inbox", body);

		let (status, _) = post(crate::router(relay.ctx.clone()), &headers, body).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn strangers_get_the_policy_reason() {
		let relay = testing::relay(Default::default()).await;
		let actor = relay.remote("stranger.example", "mastodon", 100);
		let create = Activity {
			id: "https://stranger.example/activities/1".into(),
			actor: actor.id.clone(),
			activity_type: "Create".into(),
			object: serde_json::json!({ "id": "https://stranger.example/notes/1", "type": "Note" }),
			..Default::default()
		};
		let body = serde_json::to_string(&create).unwrap();
		let headers = testing::signed_headers(&actor.public_key.id, "post", "/inbox", &body);

		let (status, reason) = post(crate::router(relay.ctx.clone()), &headers, &body).await;

		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(reason, NOT_SUBSCRIBED);
	}
}
