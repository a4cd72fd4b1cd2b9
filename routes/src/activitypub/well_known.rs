use axum::{extract::{Query, State}, Json};
use jrd::{JsonResourceDescriptor, JsonResourceDescriptorLink};
use relay::{
	model::nodeinfo::{NodeInfo, NodeInfoDiscovery, NodeInfoDiscoveryRel, Services, Software, Usage, Users, NODEINFO_SCHEMA_2_1},
	traits::fetch::ACTIVITY_JSON,
	Context,
};

use crate::{builders::JsonRD, ApiError, ApiResult};

pub const SOFTWARE_NAME: &str = "activity-relay";

pub async fn nodeinfo_discovery(State(ctx): State<Context>) -> Json<NodeInfoDiscovery> {
	Json(NodeInfoDiscovery {
		links: vec![
			NodeInfoDiscoveryRel {
				rel: NODEINFO_SCHEMA_2_1.into(),
				href: relay::url!(ctx, "/nodeinfo/2.1"),
			},
		],
	})
}

pub async fn nodeinfo(State(ctx): State<Context>) -> Json<NodeInfo> {
	// every subscribed instance counts as one user
	let subscribers = ctx.state().subscriptions().len() as u64;
	Json(NodeInfo {
		version: "2.1".to_string(),
		software: Software {
			name: SOFTWARE_NAME.to_string(),
			version: Some(relay::VERSION.to_string()),
			repository: None,
		},
		protocols: vec!["activitypub".to_string()],
		services: Services::default(),
		open_registrations: !ctx.state().toggles().manually_accept,
		usage: Usage {
			users: Users {
				total: Some(subscribers),
				active_month: Some(subscribers),
				active_halfyear: Some(subscribers),
			},
			local_posts: None,
		},
		metadata: serde_json::json!({}),
	})
}

#[derive(Debug, serde::Deserialize)]
pub struct WebfingerQuery {
	pub resource: Option<String>,
}

pub async fn webfinger(
	State(ctx): State<Context>,
	Query(query): Query<WebfingerQuery>,
) -> ApiResult<JsonRD<JsonResourceDescriptor>> {
	let Some(resource) = query.resource else {
		return Err(ApiError::bad_request());
	};

	if resource != format!("acct:{}@{}", ctx.actor().preferred_username, ctx.domain()) {
		return Err(ApiError::not_found());
	}

	Ok(JsonRD(JsonResourceDescriptor {
		subject: resource,
		aliases: vec![ctx.actor().id.clone()],
		links: vec![
			JsonResourceDescriptorLink {
				rel: "self".to_string(),
				link_type: Some(ACTIVITY_JSON.to_string()),
				href: Some(ctx.actor().id.clone()),
				properties: jrd::Map::default(),
				titles: jrd::Map::default(),
			},
		],
		properties: jrd::Map::default(),
		expires: None,
	}))
}

#[cfg(test)]
mod test {
	use axum::http::StatusCode;
	use relay::testing;

	use crate::activitypub::test::get;

	#[tokio::test]
	async fn webfinger_knows_only_the_relay() {
		let relay = testing::relay(Default::default()).await;

		let (status, content_type, body) = get(crate::router(relay.ctx.clone()), "/.well-known/webfinger?resource=acct:relay@relay.example").await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(content_type, "application/jrd+json");
		let jrd : serde_json::Value = serde_json::from_str(&body).unwrap();
		assert_eq!(jrd["subject"], "acct:relay@relay.example");
		assert_eq!(jrd["links"][0]["href"], "https://relay.example/actor");

		let (status, _, _) = get(crate::router(relay.ctx.clone()), "/.well-known/webfinger?resource=acct:alice@relay.example").await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		let (status, _, _) = get(crate::router(relay.ctx.clone()), "/.well-known/webfinger").await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn nodeinfo_counts_subscribers() {
		let relay = testing::relay(Default::default()).await;
		relay.subscribe("a.example", "mastodon").await;
		relay.subscribe("b.example", "misskey").await;

		let (status, _, body) = get(crate::router(relay.ctx.clone()), "/.well-known/nodeinfo").await;
		assert_eq!(status, StatusCode::OK);
		let discovery : relay::model::nodeinfo::NodeInfoDiscovery = serde_json::from_str(&body).unwrap();
		assert_eq!(discovery.best(), Some("https://relay.example/nodeinfo/2.1"));

		let (status, _, body) = get(crate::router(relay.ctx.clone()), "/nodeinfo/2.1").await;
		assert_eq!(status, StatusCode::OK);
		let nodeinfo : serde_json::Value = serde_json::from_str(&body).unwrap();
		assert_eq!(nodeinfo["version"], "2.1");
		assert_eq!(nodeinfo["usage"]["users"]["total"], 2);
		assert_eq!(nodeinfo["usage"]["users"]["activeHalfyear"], 2);
		assert_eq!(nodeinfo["protocols"][0], "activitypub");
	}
}
