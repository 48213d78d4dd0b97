use axum::{extract::State, Extension, Json};
use validator::Validate;

use crate::{
    dto::auth_dto::{NotifyRequest, OkResponse},
    error::{Error, Result},
    services::session_service::Claims,
    utils::extract::AppJson,
    AppState,
};

/// `POST /notify/telegram`: relays a message to a chat through the bot.
pub async fn notify_telegram(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<NotifyRequest>,
) -> Result<Json<OkResponse>> {
    let Some(chat_id) = payload.chat_id else {
        return Err(Error::BadRequest("chatId and message required".to_string()));
    };
    payload.validate()?;

    tracing::info!(sender = %claims.sub, chat_id, "Relaying notification");
    state
        .telegram_service
        .send_message(chat_id, &payload.message)
        .await?;

    Ok(Json(OkResponse { ok: true }))
}
