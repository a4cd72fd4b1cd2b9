use std::net::SocketAddr;

use tower_http::classify::{SharedClassifier, StatusInRangeAsFailures};

pub mod auth;
pub use auth::AuthInbound;

pub mod error;
pub use error::{ApiError, ApiResult};

pub mod builders;

pub mod activitypub;
pub use activitypub::ActivityPubRouter;

/// all relay routes, bound to given context
pub fn router(ctx: relay::Context) -> axum::Router {
	axum::Router::new()
		.ap_routes()
		.with_state(ctx)
}

pub async fn serve(ctx: relay::Context, bind: String, shutdown: impl ShutdownToken) -> Result<(), std::io::Error> {
	use tower_http::{cors::CorsLayer, trace::TraceLayer};

	let router = axum::Router::new()
		.ap_routes()
		.layer(
			// peers sending garbage is worth seeing in logs, so 4xx count as failures too
			TraceLayer::new(SharedClassifier::new(StatusInRangeAsFailures::new(400..=999)))
				.make_span_with(|req: &axum::http::Request<_>| {
					tracing::span!(
						tracing::Level::INFO,
						"request",
						uri = %req.uri(),
						status_code = tracing::field::Empty,
					)
				})
		)
		.layer(CorsLayer::permissive())
		.with_state(ctx);

	tracing::info!("serving relay routes on {bind}");

	let listener = tokio::net::TcpListener::bind(bind).await?;
	axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(shutdown.event())
		.await?;

	Ok(())
}

pub trait ShutdownToken: Sync + Send + 'static {
	fn event(self) -> impl std::future::Future<Output = ()> + std::marker::Send;
}
