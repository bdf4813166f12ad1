/// Admin alerts for items waiting on review
///
/// Delivery is best effort: callers go through [`dispatch`], which runs the
/// notifier on a detached task and only logs failures.
use crate::{
    config::NotificationConfig,
    error::{MarketError, MarketResult},
    wallet::{Money, PaymentMethod},
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Something an administrator should look at
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    NewSubmission {
        note_id: String,
        title: String,
        uploader_email: String,
        price: Money,
    },
    NewBalanceRequest {
        request_id: String,
        account_email: String,
        amount: Money,
        method: PaymentMethod,
        transaction_id: String,
    },
}

impl MarketEvent {
    /// Plain text rendering used for chat messages and logs
    pub fn message(&self) -> String {
        match self {
            MarketEvent::NewSubmission {
                note_id,
                title,
                uploader_email,
                price,
            } => format!(
                "New note submitted for review\nTitle: {}\nUploader: {}\nPrice: {} BDT\nNote: {}",
                title, uploader_email, price, note_id
            ),
            MarketEvent::NewBalanceRequest {
                request_id,
                account_email,
                amount,
                method,
                transaction_id,
            } => format!(
                "New balance request\nAccount: {}\nAmount: {} BDT via {}\nTransaction ID: {}\nRequest: {}",
                account_email,
                amount,
                method.as_str(),
                transaction_id,
                request_id
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &MarketEvent) -> MarketResult<()>;
}

/// Sends alerts to a Telegram chat through the Bot API
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> MarketResult<Self> {
        Self::with_base_url(TELEGRAM_API_BASE.to_string(), bot_token, chat_id)
    }

    pub fn with_base_url(base_url: String, bot_token: String, chat_id: String) -> MarketResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("notemart/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MarketError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &MarketEvent) -> MarketResult<()> {
        let response = self
            .http
            .post(self.send_message_url())
            .json(&json!({
                "chat_id": self.chat_id,
                "text": event.message(),
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| MarketError::Internal(format!("Telegram request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::Internal(format!(
                "Telegram returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Used when no bot is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &MarketEvent) -> MarketResult<()> {
        tracing::info!(event = %event.message(), "Notification (no channel configured)");
        Ok(())
    }
}

/// Pick the notifier for the given configuration
pub fn from_config(config: &NotificationConfig) -> MarketResult<Arc<dyn Notifier>> {
    match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            tracing::info!("Telegram notifications enabled");
            Ok(Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())?))
        }
        _ => {
            tracing::warn!("Telegram not configured, review alerts will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Fire and forget; failures never reach the caller
pub fn dispatch(notifier: Arc<dyn Notifier>, event: MarketEvent) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(error = %e, "Failed to deliver notification");
        }
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::Mutex;

    /// Records events instead of sending them
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub events: Mutex<Vec<MarketEvent>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &MarketEvent) -> MarketResult<()> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &MarketEvent) -> MarketResult<()> {
            Err(MarketError::Internal("channel down".to_string()))
        }
    }

    fn topup_event() -> MarketEvent {
        MarketEvent::NewBalanceRequest {
            request_id: "req-1".to_string(),
            account_email: "a@example.com".to_string(),
            amount: Money::from_major(500),
            method: PaymentMethod::Bkash,
            transaction_id: "TXN123".to_string(),
        }
    }

    #[test]
    fn test_message_mentions_key_fields() {
        let text = topup_event().message();
        assert!(text.contains("500.00"));
        assert!(text.contains("bkash"));
        assert!(text.contains("TXN123"));
    }

    #[test]
    fn test_telegram_url() {
        let notifier = TelegramNotifier::with_base_url(
            "http://localhost:9/".to_string(),
            "123:abc".to_string(),
            "42".to_string(),
        )
        .unwrap();
        assert_eq!(notifier.send_message_url(), "http://localhost:9/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let recorder = Arc::new(RecordingNotifier::default());
        dispatch(recorder.clone(), topup_event());

        for _ in 0..50 {
            if !recorder.events.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        dispatch(Arc::new(FailingNotifier), topup_event());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn test_from_config_falls_back_to_log() {
        let config = NotificationConfig {
            telegram_bot_token: Some("t".to_string()),
            telegram_chat_id: None,
        };
        assert!(from_config(&config).is_ok());
    }
}
