pub mod actor;
pub mod inbox;
pub mod status;
pub mod well_known;

use axum::{http::StatusCode, routing::{get, post}, Router};

pub trait ActivityPubRouter {
	fn ap_routes(self) -> Self;
}

impl ActivityPubRouter for Router<relay::Context> {
	fn ap_routes(self) -> Self {
		use crate::activitypub as ap;

		self
			.route("/", get(ap::status::view).fallback(bad_method))
			.route("/actor", get(ap::actor::view).fallback(bad_method))
			.route("/inbox", post(ap::inbox::post).fallback(not_found))
			.nest("/.well-known", Router::new()
				.route("/webfinger", get(ap::well_known::webfinger).fallback(bad_method))
				.route("/nodeinfo", get(ap::well_known::nodeinfo_discovery).fallback(bad_method))
			)
			.route("/nodeinfo/2.1", get(ap::well_known::nodeinfo).fallback(bad_method))
	}
}

async fn bad_method() -> StatusCode {
	StatusCode::BAD_REQUEST
}

async fn not_found() -> StatusCode {
	StatusCode::NOT_FOUND
}

#[cfg(test)]
mod test {
	use axum::{body::Body, http::{Request, StatusCode}};
	use relay::testing;
	use tower::ServiceExt;

	pub(crate) async fn get(router: axum::Router, uri: &str) -> (StatusCode, String, String) {
		let res = router
			.oneshot(Request::get(uri).body(Body::empty()).unwrap())
			.await
			.unwrap();
		let status = res.status();
		let content_type = res.headers()
			.get("content-type")
			.map(|x| x.to_str().unwrap().to_string())
			.unwrap_or_default();
		let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
		(status, content_type, String::from_utf8_lossy(&body).to_string())
	}

	#[tokio::test]
	async fn wrong_methods_are_refused() {
		let relay = testing::relay(Default::default()).await;
		for (method, uri, expected) in [
			("POST", "/actor", StatusCode::BAD_REQUEST),
			("DELETE", "/.well-known/nodeinfo", StatusCode::BAD_REQUEST),
			("PUT", "/nodeinfo/2.1", StatusCode::BAD_REQUEST),
			("POST", "/", StatusCode::BAD_REQUEST),
			("GET", "/inbox", StatusCode::NOT_FOUND),
			("PUT", "/inbox", StatusCode::NOT_FOUND),
		] {
			let res = crate::router(relay.ctx.clone())
				.oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
				.await
				.unwrap();
			assert_eq!(res.status(), expected, "{method} {uri}");
		}
	}

	#[tokio::test]
	async fn actor_is_served_as_activity_json() {
		let relay = testing::relay(Default::default()).await;
		let (status, content_type, body) = get(crate::router(relay.ctx.clone()), "/actor").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(content_type, "application/activity+json");
		let actor : relay::model::Actor = serde_json::from_str(&body).unwrap();
		assert_eq!(actor.id, "https://relay.example/actor");
		assert_eq!(actor.actor_type, "Service");
		assert!(actor.public_key.public_key_pem.contains("PUBLIC KEY"));
	}
}
