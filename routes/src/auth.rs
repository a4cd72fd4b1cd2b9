use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRef, FromRequest, Request};
use relay::{auth::{Inbound, SignedRequest}, Context};

use crate::ApiError;

/// inbox payloads are small, anything bigger is not an activity worth relaying
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// activity delivered to us with a verified http signature
pub struct AuthInbound {
	pub inbound: Inbound,
	/// address of the sender, according to `security.ip_source`
	pub remote: String,
}

impl<S> FromRequest<S> for AuthInbound
where
	Context: FromRef<S>,
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let ctx = Context::from_ref(state);
		let (parts, body) = req.into_parts();

		let remote = match ctx.cfg().security.ip_source.as_str() {
			"origin" => parts.extensions
				.get::<ConnectInfo<SocketAddr>>()
				.map(|ConnectInfo(addr)| addr.ip().to_string()),
			header => parts.headers
				.get(header)
				.and_then(|x| x.to_str().ok())
				.and_then(|x| x.split(',').next())
				.map(|x| x.trim().to_string()),
		}
			.unwrap_or_else(|| "unknown".to_string());

		let body = axum::body::to_bytes(body, MAX_BODY_SIZE)
			.await
			.map_err(|e| {
				tracing::debug!("could not read inbox body from {remote}: {e}");
				ApiError::bad_request()
			})?;

		let headers = parts.headers
			.iter()
			.filter_map(|(k, v)| Some((k.as_str().to_lowercase(), v.to_str().ok()?.to_string())))
			.collect();

		let target = parts.uri
			.path_and_query()
			.map(|x| x.as_str())
			.unwrap_or_else(|| parts.uri.path());

		let inbound = ctx.authenticate(SignedRequest {
			method: parts.method.as_str(),
			target,
			headers,
			body: &body,
		}).await?;

		Ok(AuthInbound { inbound, remote })
	}
}
