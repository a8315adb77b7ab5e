use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Errors delivering to a single client. Never escapes `broadcast`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("client connection already closed")]
    Closed,
}

/// Errors while waiting for a poll answer
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    #[error("poll handle was dropped without a response")]
    Abandoned,
}

/// Errors surfaced by the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Poll(#[from] PollError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Poll(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}
