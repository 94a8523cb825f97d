//! Alert rules and the channels alerts are delivered on.

use serde::Deserialize;

use crate::application::health::AlertConfig;

/// `[alerts]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertsConfig {
    /// Rule evaluation settings.
    #[serde(flatten)]
    pub rules: AlertConfig,
    /// JSON POST target for every notification.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Telegram channel.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Telegram notification channel.
///
/// The bot token is loaded from `ORACLED_TELEGRAM_TOKEN`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Chat receiving the messages.
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(skip)]
    pub token: Option<String>,
}
