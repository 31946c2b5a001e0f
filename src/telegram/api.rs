use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bot::MessagingChannel;
use crate::error::{Result, ScoreSwapError};

const LONG_POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// One inbound text message, keyed by chat id.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Thin Telegram Bot API client: long-poll for updates, send plain text.
pub struct TelegramApi {
    bot_token: String,
    client: Client,
}

impl TelegramApi {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: Client::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    fn check<T>(response: ApiResponse<T>, method: &str) -> Result<T> {
        if !response.ok {
            return Err(ScoreSwapError::system_error(format!(
                "Telegram {} failed: {}",
                method,
                response.description.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        response.result.ok_or_else(|| {
            ScoreSwapError::system_error(format!("Telegram {} returned no result", method))
        })
    }

    pub async fn get_me(&self) -> Result<String> {
        #[derive(Debug, Deserialize)]
        struct Me {
            username: Option<String>,
        }

        let response: ApiResponse<Me> = self
            .client
            .get(self.url("getMe"))
            .send()
            .await?
            .json()
            .await?;
        let me = Self::check(response, "getMe")?;
        Ok(me.username.unwrap_or_default())
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let response: ApiResponse<Vec<Update>> = self
            .client
            .get(self.url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_TIMEOUT_SECS.to_string()),
            ])
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 10))
            .send()
            .await?
            .json()
            .await?;
        Self::check(response, "getUpdates")
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("sendMessage"))
            .form(&[("chat_id", chat_id.to_string().as_str()), ("text", text)])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Failed to send Telegram message: {}", error_text);
            return Err(ScoreSwapError::system_error(format!(
                "Telegram API error: {}",
                error_text
            )));
        }

        debug!("Sent message to chat {}", chat_id);
        Ok(())
    }
}

#[async_trait]
impl MessagingChannel for TelegramApi {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

/// Long-polls Telegram for updates and feeds text messages into the
/// dispatch channel.
pub struct UpdatePoller {
    api: Arc<TelegramApi>,
    tx: mpsc::Sender<InboundMessage>,
}

impl UpdatePoller {
    pub fn new(api: Arc<TelegramApi>, tx: mpsc::Sender<InboundMessage>) -> Self {
        Self { api, tx }
    }

    pub async fn start_polling(&self) -> Result<()> {
        info!("Starting Telegram long-poll loop...");
        let mut offset = 0i64;

        loop {
            let updates = match self.api.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("getUpdates failed: {}", e);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let Some(message) = update.message else {
                    continue;
                };
                let Some(text) = message.text else {
                    continue;
                };

                let inbound = InboundMessage {
                    chat_id: message.chat.id,
                    text,
                };
                if self.tx.send(inbound).await.is_err() {
                    return Err(ScoreSwapError::system_error("inbound channel closed"));
                }
            }
        }
    }
}
