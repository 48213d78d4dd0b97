use reqwest::Client;
use serde_json::json;

use crate::error::{Error, Result};

/// Thin client for the Bot API `sendMessage` call.
#[derive(Clone)]
pub struct TelegramService {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramService {
    pub fn new(client: Client, api_base: String, bot_token: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });

        tracing::info!(chat_id, "Sending Telegram message");

        // reqwest errors embed the URL, which carries the token
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(chat_id, status = %status, body = %text, "Telegram sendMessage failed");
            return Err(Error::Upstream(format!("Telegram API returned {}", status)));
        }

        Ok(())
    }
}
