use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::utils::telegram_auth::TelegramAuthError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Telegram auth error: {0}")]
    TelegramAuth(#[from] TelegramAuthError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid JSON body: {0}")]
    JsonBody(#[from] JsonRejection),

    #[error("Session token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::JsonBody(JsonRejection::MissingJsonContentType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Error::JsonBody(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) | Error::Jwt(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::TelegramAuth(err) => match err {
                TelegramAuthError::MissingSignature | TelegramAuthError::MalformedPayload(_) => {
                    StatusCode::BAD_REQUEST
                }
                TelegramAuthError::SignatureMismatch | TelegramAuthError::Expired { .. } => {
                    StatusCode::UNAUTHORIZED
                }
            },
            Error::Reqwest(_) | Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let error_message = match self {
            Error::BadRequest(msg)
            | Error::Unauthorized(msg)
            | Error::Forbidden(msg)
            | Error::ServiceUnavailable(msg) => msg,
            Error::TelegramAuth(err) => err.reason().to_string(),
            Error::Validation(err) => err.to_string(),
            Error::JsonBody(err) => err.body_text(),
            Error::Jwt(_) => "invalid_token".to_string(),
            Error::Reqwest(err) => format!("External service error: {}", err),
            Error::Upstream(msg) => format!("External service error: {}", msg),
            Error::Database(err) => {
                tracing::error!(error = ?err, "Database error");
                "Database error".to_string()
            }
            Error::Config(_) => "An unexpected error occurred".to_string(),
        };

        let body = Json(json!({ "ok": false, "error": error_message }));
        (status, body).into_response()
    }
}
