use axum::{extract::State, response::Html};
use relay::{model::SubscriptionInfo, Context};

use crate::ApiResult;

fn escape(text: &str) -> String {
	text
		.replace('&', "&amp;")
		.replace('<', "&lt;")
		.replace('>', "&gt;")
		.replace('"', "&quot;")
		.replace('\'', "&#39;")
}

fn row(domain: &str, info: Option<&SubscriptionInfo>) -> String {
	let (software, version, users) = match info {
		Some(info) => (info.software.as_str(), info.version.as_str(), info.total_user.to_string()),
		None => ("?", "?", "?".to_string()),
	};
	format!(
		"<tr><td><a href=\"https://{d}\">{d}</a></td><td>{}</td><td>{}</td><td>{users}</td></tr>",
		escape(software), escape(version), d = escape(domain),
	)
}

/// human readable overview of the relay and its subscribers
pub async fn view(State(ctx): State<Context>) -> ApiResult<Html<String>> {
	let subscriptions = ctx.state().subscriptions();
	let mut rows = Vec::with_capacity(subscriptions.len());
	for sub in subscriptions.iter() {
		let info = ctx.state().info(&sub.domain).await?;
		rows.push(row(&sub.domain, info.as_ref()));
	}

	let name = ctx.actor().name.as_deref().unwrap_or("ActivityPub Relay");
	let summary = ctx.actor().summary.as_deref().unwrap_or_default();

	Ok(Html(format!(
		r#"<!DOCTYPE html>
<html>
	<head>
		<meta charset="utf-8">
		<title>{name}</title>
	</head>
	<body>
		<h1>{name}</h1>
		<p>{summary}</p>
		<p>subscribe with <code>{inbox}</code></p>
		<p>{count} instances subscribed</p>
		<table>
			<tr><th>domain</th><th>software</th><th>version</th><th>users</th></tr>
			{rows}
		</table>
		<footer>rendered at {time}</footer>
	</body>
</html>"#,
		name = escape(name),
		summary = escape(summary),
		inbox = escape(&relay::url!(ctx, "/inbox")),
		count = subscriptions.len(),
		rows = rows.join("\n\t\t\t"),
		time = chrono::Utc::now().to_rfc3339(),
	)))
}

#[cfg(test)]
mod test {
	use axum::http::StatusCode;
	use relay::testing;

	use crate::activitypub::test::get;

	#[tokio::test]
	async fn status_page_lists_subscribers() {
		let relay = testing::relay(Default::default()).await;
		relay.subscribe("a.example", "mastodon").await;
		relay.subscribe("b.example", "<script>").await;

		let (status, content_type, body) = get(crate::router(relay.ctx.clone()), "/").await;

		assert_eq!(status, StatusCode::OK);
		assert!(content_type.starts_with("text/html"));
		assert!(body.contains("2 instances subscribed"));
		assert!(body.contains(">a.example</a>"));
		assert!(body.contains("mastodon"));
		assert!(!body.contains("<script>"));
		assert!(body.contains("https://relay.example/inbox"));
	}

	#[test]
	fn hostile_domains_stay_inside_attributes() {
		let row = super::row("x\"onmouseover='alert(1)'", None);
		assert!(row.contains("href=\"https://x&quot;onmouseover=&#39;alert(1)&#39;\""));
		assert!(!row.contains("'"));
	}
}
