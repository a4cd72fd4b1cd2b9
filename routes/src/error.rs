use axum::http::StatusCode;

use relay::{auth::AuthError, dispatch::DispatchError, store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("could not authenticate request: {0}")]
	Auth(#[from] AuthError),

	#[error("could not process activity: {0}")]
	Dispatch(#[from] DispatchError),

	#[error("store error: {0}")]
	Store(#[from] StoreError),

	// policy reason, the only text peers ever get back
	#[error("{0}")]
	Rejected(String),

	// wrapper error to return arbitraty status codes
	#[error("{0}")]
	Status(StatusCode),
}

impl ApiError {
	pub fn bad_request() -> Self {
		Self::Status(StatusCode::BAD_REQUEST)
	}

	pub fn not_found() -> Self {
		Self::Status(StatusCode::NOT_FOUND)
	}
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<StatusCode> for ApiError {
	fn from(value: StatusCode) -> Self {
		ApiError::Status(value)
	}
}

impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		match self {
			ApiError::Status(status) => status.into_response(),
			ApiError::Rejected(reason) => {
				tracing::info!("refusing activity: {reason}");
				(StatusCode::BAD_REQUEST, reason).into_response()
			},
			ApiError::Auth(e) => {
				match e {
					AuthError::KeyUnresolvable(_) | AuthError::ActorUnresolvable(_)
						| AuthError::KeyMismatch { .. } | AuthError::ActorMismatch { .. } => tracing::warn!("{e}"),
					_ => tracing::debug!("{e}"),
				}
				StatusCode::BAD_REQUEST.into_response()
			},
			x => {
				tracing::error!("failed serving request: {x}");
				StatusCode::INTERNAL_SERVER_ERROR.into_response()
			},
		}
	}
}
