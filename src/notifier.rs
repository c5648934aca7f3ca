use crate::config::{ConfigError, TelegramConfig};
use crate::error::{WatchError, WatchResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound alert channel. Push only: no retry, no queue, no receipt.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> WatchResult<()>;
}

/// Sends and logs instead of failing. For alerts whose loss is acceptable.
pub async fn send_best_effort<N: Notifier + ?Sized>(notifier: &N, text: &str) {
    if let Err(e) = notifier.send(text).await {
        warn!("Dropping alert: {}", e);
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API `sendMessage`.
pub struct TelegramNotifier {
    http: Option<reqwest::Client>,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ConfigError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        if config.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token"));
        }
        if config.chat_id.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.chat_id"));
        }

        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("telegram http client: {e}")))?;

        Ok(Self {
            http: Some(http),
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token.trim()
            ),
            chat_id: config.chat_id.trim().to_string(),
        })
    }

    /// Every send is a silent no-op.
    pub fn disabled() -> Self {
        Self {
            http: None,
            endpoint: String::new(),
            chat_id: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.http.is_some()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> WatchResult<()> {
        let Some(http) = &self.http else {
            debug!("Notifier disabled, skipping alert");
            return Ok(());
        };

        let response = http
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            // reqwest errors carry the URL, which contains the bot token
            .map_err(|e| WatchError::Notify(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Notify(format!("telegram returned {status}: {body}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: "-1001".to_string(),
            api_url: "https://api.telegram.org/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_send_is_noop() {
        let notifier = TelegramNotifier::from_config(&TelegramConfig {
            enabled: false,
            ..enabled_config()
        })
        .unwrap();

        assert!(!notifier.is_enabled());
        assert!(notifier.send("hello").await.is_ok());
    }

    #[test]
    fn test_enabled_requires_credentials() {
        let missing_token = TelegramConfig {
            bot_token: String::new(),
            ..enabled_config()
        };
        assert!(matches!(
            TelegramNotifier::from_config(&missing_token),
            Err(ConfigError::Missing("telegram.bot_token"))
        ));

        let missing_chat = TelegramConfig {
            chat_id: " ".to_string(),
            ..enabled_config()
        };
        assert!(matches!(
            TelegramNotifier::from_config(&missing_chat),
            Err(ConfigError::Missing("telegram.chat_id"))
        ));
    }

    #[test]
    fn test_endpoint_format() {
        let notifier = TelegramNotifier::from_config(&enabled_config()).unwrap();
        assert!(notifier.is_enabled());
        assert_eq!(
            notifier.endpoint,
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_notify_error() {
        let notifier = TelegramNotifier::from_config(&TelegramConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            ..enabled_config()
        })
        .unwrap();

        assert!(matches!(
            notifier.send("hello").await,
            Err(WatchError::Notify(_))
        ));
        send_best_effort(&notifier, "hello").await;
    }
}
