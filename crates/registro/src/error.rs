use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::html;

/// Failure of a mark-attendance submission
#[derive(Debug, thiserror::Error)]
pub enum MarkError {
    /// Required fields were missing; nothing was written
    #[error("invalid submission: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The batch was rolled back
    #[error("failed to save attendance: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Errors surfaced by request handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Html(html::render_error_page("Bad request", &message).into_string()),
            )
                .into_response(),
            Self::Internal(err) => {
                error!(error = %format!("{:#}", err), "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(
                        html::render_error_page(
                            "Something went wrong",
                            "The request could not be completed. Please try again later.",
                        )
                        .into_string(),
                    ),
                )
                    .into_response()
            }
        }
    }
}
