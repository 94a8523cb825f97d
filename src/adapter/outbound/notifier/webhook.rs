//! JSON POST notification channel.

use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::format::event_payload;
use crate::error::{ConfigError, Result};
use crate::port::{Event, Notifier};

/// Posts every event as JSON to a fixed URL.
///
/// Delivery happens on a background task; a failed POST is logged and
/// dropped.
pub struct WebhookNotifier {
    sender: mpsc::UnboundedSender<Event>,
}

impl WebhookNotifier {
    /// Create the notifier and spawn its delivery worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid URL.
    pub fn new(url: &str) -> Result<Self> {
        let url = url::Url::parse(url).map_err(|e| ConfigError::InvalidValue {
            field: "alerts.webhook_url",
            reason: e.to_string(),
        })?;
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(webhook_worker(Client::new(), url, receiver));
        Ok(Self { sender })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("Webhook notifier channel closed");
        }
    }
}

async fn webhook_worker(client: Client, url: url::Url, mut receiver: mpsc::UnboundedReceiver<Event>) {
    info!(url = %url, "Webhook notifier started");

    while let Some(event) = receiver.recv().await {
        let body = event_payload(&event);
        let result = client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(_) => debug!(event = %body["event"], "Webhook delivered"),
            Err(e) => warn!(error = %e, event = %body["event"], "Webhook delivery failed"),
        }
    }

    debug!("Webhook notifier worker shutting down");
}
