use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use medichat_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("chat session not found")]
    SessionNotFound,

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("upload error: {0}")]
    Upload(#[from] axum::extract::multipart::MultipartError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::SessionNotFound => StatusCode::NOT_FOUND,
            ServerError::Upload(e) => e.status(),
            ServerError::Template(_) | ServerError::Core(_) => {
                tracing::error!("request failed: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.to_string()).into_response()
    }
}
