use axum::{extract::State, Extension, Json};
use validator::Validate;

use crate::{
    dto::auth_dto::{SessionInfoResponse, TelegramAuthRequest, TelegramAuthResponse},
    error::{Error, Result},
    services::session_service::Claims,
    utils::{extract::AppJson, telegram_auth::TelegramAuthError},
    AppState,
};

/// `POST /auth/telegram`: verifies Mini App `initData`, checks the
/// allow-list and returns a session token.
pub async fn telegram_login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<TelegramAuthRequest>,
) -> Result<Json<TelegramAuthResponse>> {
    payload.validate()?;

    let user = match state.verifier.authenticate(&payload.init_data) {
        Ok(user) => user,
        Err(err @ TelegramAuthError::MalformedPayload(_)) => {
            tracing::error!(reason = err.reason(), error = %err, "Signed init data has a malformed payload");
            return Err(err.into());
        }
        Err(err) => {
            tracing::warn!(reason = err.reason(), "Rejected Telegram init data");
            return Err(err.into());
        }
    };

    let authorized = tokio::time::timeout(
        state.allow_list_timeout,
        state.authorizer.is_authorized(user.id),
    )
    .await
    .map_err(|_| {
        tracing::error!(telegram_id = user.id, "Allow-list lookup timed out");
        Error::ServiceUnavailable("allow_list_unavailable".to_string())
    })??;

    if !authorized {
        tracing::warn!(telegram_id = user.id, "Telegram user is not on the allow-list");
        return Err(Error::Forbidden("unauthorized_telegram_user".to_string()));
    }

    let token = state.sessions.issue(&user)?;
    tracing::info!(telegram_id = user.id, "Telegram user authenticated");

    Ok(Json(TelegramAuthResponse {
        ok: true,
        user,
        token,
    }))
}

/// `GET /auth/me`
pub async fn me(Extension(claims): Extension<Claims>) -> Result<Json<SessionInfoResponse>> {
    Ok(Json(SessionInfoResponse {
        ok: true,
        telegram_id: claims.telegram_id()?,
    }))
}
