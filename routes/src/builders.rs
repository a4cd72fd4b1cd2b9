use axum::response::{IntoResponse, Response};

use relay::traits::fetch::ACTIVITY_JSON;

pub struct JsonLD<T>(pub T);
impl<T: serde::Serialize> IntoResponse for JsonLD<T> {
	fn into_response(self) -> Response {
		(
			[("Content-Type", ACTIVITY_JSON)],
			axum::Json(self.0)
		).into_response()
	}
}

pub struct JsonRD<T>(pub T);
impl<T: serde::Serialize> IntoResponse for JsonRD<T> {
	fn into_response(self) -> Response {
		([("Content-Type", "application/jrd+json")], axum::Json(self.0)).into_response()
	}
}
