use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::telegram_auth::UserIdentity;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TelegramAuthRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "initData is required"))]
    pub init_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelegramAuthResponse {
    pub ok: bool,
    pub user: UserIdentity,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub ok: bool,
    pub telegram_id: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub chat_id: Option<i64>,
    #[serde(default)]
    #[validate(length(min = 1, max = 4096, message = "message must be 1 to 4096 characters"))]
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}
