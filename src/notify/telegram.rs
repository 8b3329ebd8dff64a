//! Telegram Bot API delivery

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::MessageSink;
use crate::config::NotifierSettings;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends HTML messages to one chat via `sendMessage`
pub struct TelegramSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(settings: &NotifierSettings) -> Result<Self> {
        if !settings.has_credentials() {
            return Err(Error::MissingEnvVar(
                "TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Notification(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            // the URL carries the bot token, keep it out of logs
            .map_err(|e| Error::Notification(e.without_url().to_string()))?;

        let status = resp.status();
        let parsed: TelegramResponse = resp
            .json()
            .await
            .map_err(|e| Error::Notification(e.without_url().to_string()))?;
        check_response(status.as_u16(), parsed)?;

        debug!("Telegram message sent");
        Ok(())
    }
}

fn check_response(status: u16, resp: TelegramResponse) -> Result<()> {
    if resp.ok {
        return Ok(());
    }
    Err(Error::Notification(format!(
        "Telegram rejected message (status {}): {}",
        status,
        resp.description.unwrap_or_else(|| "no description".to_string())
    )))
}
