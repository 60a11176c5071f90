//! Telegram Bot API notifier

use super::Notifier;
use crate::error::{AppError, AppResult};
use crate::traffic::executor::Timeouts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Environment variable holding the bot token; it is never read from files
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Bot token from the environment, if set and non-empty
pub fn bot_token() -> Option<String> {
    std::env::var(BOT_TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages with `sendMessage`
///
/// The token is part of the request URL, so errors are stripped of their URL
/// before they are logged or returned.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
        timeouts: Timeouts,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    /// `sendMessage` URL with the token masked, for errors and logs
    fn redacted_url(&self) -> String {
        format!("{}/bot<token>/sendMessage", self.api_base)
    }

    fn transport_error(&self, err: reqwest::Error) -> AppError {
        AppError::Transport {
            url: self.redacted_url(),
            reason: err.without_url().to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> AppResult<()> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        let reply = match serde_json::from_str::<ApiReply>(&body) {
            Ok(reply) => reply,
            Err(e) if status.is_success() => {
                return Err(AppError::Parse {
                    url: self.redacted_url(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                tracing::warn!(
                    chat_id = %self.chat_id,
                    status = status.as_u16(),
                    "Telegram answered with a non-JSON error page"
                );
                return Err(AppError::UnexpectedStatus {
                    url: self.redacted_url(),
                    status: status.as_u16(),
                });
            }
        };

        if status.is_success() && reply.ok {
            tracing::debug!(chat_id = %self.chat_id, "Telegram message sent");
            return Ok(());
        }

        let description = reply
            .description
            .unwrap_or_else(|| "no description".to_string());
        tracing::warn!(
            chat_id = %self.chat_id,
            status = status.as_u16(),
            description = %description,
            "Telegram rejected the message"
        );
        Err(AppError::Notify(format!(
            "Telegram returned {}: {}",
            status.as_u16(),
            description
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_url_layout() {
        let notifier = TelegramNotifier::new(
            "https://api.telegram.org/",
            "123:abc",
            "42",
            Timeouts::default(),
        )
        .unwrap();
        assert_eq!(
            notifier.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_redacted_url_masks_token() {
        let notifier =
            TelegramNotifier::new("http://tg", "123:abc", "42", Timeouts::default()).unwrap();
        assert_eq!(notifier.redacted_url(), "http://tg/bot<token>/sendMessage");
    }

    #[test]
    fn test_debug_hides_token() {
        let notifier =
            TelegramNotifier::new("http://localhost", "secret-token", "42", Timeouts::default())
                .unwrap();
        let debug = format!("{:?}", notifier);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("42"));
    }

    #[test]
    fn test_payload_shape() {
        let payload = SendMessage {
            chat_id: "42",
            text: "*hi*",
            parse_mode: "Markdown",
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"chat_id": "42", "text": "*hi*", "parse_mode": "Markdown"})
        );
    }
}
