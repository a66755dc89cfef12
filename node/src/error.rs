use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hamrokotha_fraud_core::ReportError;
use hamrokotha_messaging::MessagingError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the listing and messaging services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid user identity")]
    Unauthenticated,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Messaging(MessagingError::EmptyBody) => StatusCode::BAD_REQUEST,
            ServiceError::Messaging(MessagingError::NotParticipant)
            | ServiceError::Messaging(MessagingError::NotOwner) => StatusCode::FORBIDDEN,
            ServiceError::Messaging(MessagingError::NotInquiry) => StatusCode::BAD_REQUEST,
            ServiceError::Messaging(MessagingError::InvalidTransition { .. }) => {
                StatusCode::CONFLICT
            }
            ServiceError::Report(ReportError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ServiceError::Report(ReportError::DescriptionTooLong) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServiceError::Internal(e) => {
                error!(error = ?e, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
