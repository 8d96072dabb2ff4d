//! Telegram Bot API client

use std::time::Duration;

use felarr_core::{FelarrError, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const SERVICE: &str = "telegram";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub timeout: u64,
    /// Long-poll window for getUpdates, in seconds.
    pub poll_timeout: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            timeout: 30,
            poll_timeout: 30,
        }
    }
}

/// Shared token bucket: at most one outbound message per second per chat.
#[derive(Debug)]
struct RateLimiter {
    min_interval: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send: Mutex::new(None),
        }
    }

    async fn acquire(&self) {
        let mut last = self.last_send.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub data: Option<String>,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    pub username: Option<String>,
}

#[derive(Debug)]
pub struct TelegramClient {
    config: TelegramConfig,
    client: Client,
    rate_limiter: RateLimiter,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(FelarrError::ConfigurationError {
                field: "telegram.bot_token".to_string(),
                message: "bot token is required".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout + config.poll_timeout))
            .build()
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        Ok(Self {
            config,
            client,
            rate_limiter: RateLimiter::new(Duration::from_secs(1)),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Override the API host; test hook.
    #[cfg(test)]
    fn method_url_base(&self, base: &str, method: &str) -> String {
        format!("{}/bot{}/{}", base, self.config.bot_token, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        self.call_url(&self.method_url(method), payload).await
    }

    async fn call_url<T: DeserializeOwned>(&self, url: &str, payload: &Value) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FelarrError::transport(SERVICE, e))?;

        if !status.is_success() {
            return Err(FelarrError::protocol(SERVICE, status.as_u16(), &body));
        }

        let parsed: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| FelarrError::malformed(SERVICE, e))?;

        if !parsed.ok {
            return Err(FelarrError::protocol(
                SERVICE,
                status.as_u16(),
                parsed.description.as_deref().unwrap_or("api returned not ok"),
            ));
        }

        parsed
            .result
            .ok_or_else(|| FelarrError::malformed(SERVICE, "ok response without result"))
    }

    /// Send an HTML message, optionally with an inline keyboard. Returns
    /// the message id. Rate limited.
    pub async fn send_message(
        &self,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<i64> {
        self.rate_limiter.acquire().await;

        let mut payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = markup;
        }

        let message: Message = self.call("sendMessage", &payload).await?;
        debug!(message_id = message.message_id, "telegram message sent");
        Ok(message.message_id)
    }

    /// Replace a message's text, dropping its keyboard.
    pub async fn edit_message_text(&self, message_id: i64, text: &str) -> Result<()> {
        self.rate_limiter.acquire().await;

        let payload = json!({
            "chat_id": self.config.chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        // editMessageText returns the edited message
        let _: Value = self.call("editMessageText", &payload).await?;
        Ok(())
    }

    /// Stop the client-side loading animation of a button press.
    pub async fn answer_callback_query(&self, callback_query_id: &str, text: &str) -> Result<()> {
        let payload = json!({
            "callback_query_id": callback_query_id,
            "text": text,
        });
        let _: Value = self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }

    /// Long-poll for updates past `offset`. Only callback queries are
    /// requested.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": self.config.poll_timeout,
            "allowed_updates": ["callback_query"],
        });
        self.call("getUpdates", &payload).await
    }

    /// Connection test; resolves the bot's username.
    pub async fn test_connection(&self) -> Result<String> {
        let user: BotUser = self.call("getMe", &json!({})).await?;
        Ok(user.username.unwrap_or_else(|| "unknown".to_string()))
    }
}
