//! Telegram notification channel.
//!
//! Requires the `telegram` feature to be enabled.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::format::{event_summary, truncate};
use crate::domain::AlertSeverity;
use crate::port::{Event, Notifier};

/// Longest message body sent, in characters.
const MAX_MESSAGE_CHARS: usize = 600;

/// Bot credentials and target chat.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    /// Bot API token obtained from BotFather.
    pub bot_token: String,
    /// Target chat ID for notifications.
    pub chat_id: i64,
}

/// Sends resolution failures and alerts to a Telegram chat.
pub struct TelegramNotifier {
    sender: mpsc::UnboundedSender<Event>,
}

impl TelegramNotifier {
    /// Create the notifier and spawn the background worker.
    #[must_use]
    pub fn new(settings: TelegramSettings) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(telegram_worker(settings, receiver));
        Self { sender }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("Telegram notifier channel closed");
        }
    }
}

async fn telegram_worker(settings: TelegramSettings, mut receiver: mpsc::UnboundedReceiver<Event>) {
    let bot = Bot::new(&settings.bot_token);
    let chat_id = ChatId(settings.chat_id);

    info!(chat_id = settings.chat_id, "Telegram notifier started");

    while let Some(event) = receiver.recv().await {
        let Some(text) = format_event_message(&event) else {
            continue;
        };
        if let Err(e) = bot
            .send_message(chat_id, &text)
            .parse_mode(ParseMode::MarkdownV2)
            .await
        {
            error!(error = %e, "Failed to send Telegram message");
        }
    }

    warn!("Telegram notifier worker shutting down");
}

/// Format an event as `MarkdownV2`, or `None` for routine progress events.
fn format_event_message(event: &Event) -> Option<String> {
    let header = match event {
        Event::MarketIngested { .. } => return None,
        Event::MarketCommitted(_) => "📝 *Outcome Committed*",
        Event::MarketResolved { .. } => "✅ *Market Resolved*",
        Event::TransactionFailed(_) => "❌ *Transaction Reverted*",
        Event::TransactionTimeout(_) => "⏱️ *Transaction Timed Out*",
        Event::JobFailed(_) => "🛑 *Job Failed*",
        Event::AlertFired(alert) => match alert.severity {
            AlertSeverity::Critical => "🚨 *Critical Alert*",
            AlertSeverity::Warning => "⚠️ *Warning*",
            AlertSeverity::Info => "ℹ️ *Notice*",
        },
        Event::AlertResolved(_) => "✅ *Alert Cleared*",
    };
    let body = truncate(&event_summary(event), MAX_MESSAGE_CHARS);
    Some(format!("{header}\n\n{}", escape_markdown(&body)))
}

/// Escape special characters for Telegram `MarkdownV2`.
fn escape_markdown(text: &str) -> String {
    let special_chars = [
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut result = String::with_capacity(text.len() * 2);

    for c in text.chars() {
        if special_chars.contains(&c) {
            result.push('\\');
        }
        result.push(c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Alert, JobId, JobType};
    use crate::port::JobFailedEvent;
    use crate::testkit::fixtures;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("hello"), "hello");
        assert_eq!(escape_markdown("hello_world"), "hello\\_world");
        assert_eq!(escape_markdown("*bold*"), "\\*bold\\*");
        assert_eq!(escape_markdown("test.com"), "test\\.com");
    }

    #[test]
    fn ingestion_is_not_sent() {
        let event = Event::MarketIngested {
            market_id: fixtures::market_id(1),
            subject: "token_price:ETH".into(),
            resolve_at: fixtures::t0(),
        };
        assert!(format_event_message(&event).is_none());
    }

    #[test]
    fn job_failure_is_escaped() {
        let event = Event::JobFailed(JobFailedEvent {
            job_id: JobId::generate(),
            job_type: JobType::ResolveMarket,
            market_id: fixtures::market_id(1),
            attempts: 5,
            error: "rpc error: timed out (10s)".into(),
        });
        let text = format_event_message(&event).unwrap();
        assert!(text.starts_with("🛑 *Job Failed*"));
        assert!(text.contains("\\(10s\\)"));
    }

    #[test]
    fn critical_alert_has_its_own_header() {
        let alert = Alert::fire("system_unhealthy", "system_unhealthy", AlertSeverity::Critical, "down", fixtures::t0());
        let text = format_event_message(&Event::AlertFired(alert)).unwrap();
        assert!(text.starts_with("🚨"));
    }
}
