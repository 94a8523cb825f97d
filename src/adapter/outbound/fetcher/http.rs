//! Generic JSON-over-HTTP metric source.
//!
//! Requests `GET {base_url}/{kind}/{key}?timestamp={unix}` and expects
//! `{value, timestamp, confidence, metadata}` back. `value` may be a decimal
//! string or a JSON number; its fractional digits define the precision.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{fixed, MetricValue, Subject, SubjectKind};
use crate::error::FetchError;
use crate::infrastructure::config::FetcherConfig;
use crate::port::MetricFetcher;

/// Timeout of the liveness check behind [`MetricFetcher::is_healthy`].
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Text(String),
    Number(serde_json::Number),
}

impl WireNumber {
    fn literal(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTime {
    Unix(i64),
    Rfc3339(String),
}

#[derive(Deserialize)]
struct WireMetric {
    value: WireNumber,
    timestamp: WireTime,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    metadata: serde_json::Value,
}

fn default_confidence() -> f64 {
    1.0
}

/// HTTP metric source configured from a `[[fetchers]]` entry.
#[derive(Debug)]
pub struct HttpMetricFetcher {
    id: String,
    base_url: String,
    kinds: Vec<SubjectKind>,
    api_key: Option<String>,
    timeout: Duration,
    client: Client,
}

impl HttpMetricFetcher {
    /// Create a fetcher; the request timeout comes from the resilience
    /// settings so a hung socket cannot outlive the decorator's race.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &FetcherConfig) -> crate::error::Result<Self> {
        let timeout = Duration::from_millis(config.resilience.timeout_ms);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id: config.id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            kinds: config.kinds.clone(),
            api_key: config.api_key.clone(),
            timeout,
            client,
        })
    }

    fn url(&self, subject: &Subject) -> String {
        format!("{}/{}/{}", self.base_url, subject.kind, subject.key())
    }

    fn transient(&self, message: impl Into<String>) -> FetchError {
        FetchError::Transient {
            source_id: self.id.clone(),
            message: message.into(),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> FetchError {
        FetchError::InvalidResponse {
            source_id: self.id.clone(),
            message: message.into(),
        }
    }

    fn map_request_error(&self, err: &reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                source_id: self.id.clone(),
                after: self.timeout,
            }
        } else if err.is_connect() || err.is_request() {
            self.transient(err.to_string())
        } else {
            self.invalid(err.to_string())
        }
    }

    fn map_status(&self, status: StatusCode) -> Option<FetchError> {
        if status.is_success() {
            None
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Some(self.transient(format!("HTTP {status}")))
        } else {
            Some(self.invalid(format!("HTTP {status}")))
        }
    }

    /// Turn a response body into a value.
    fn parse_body(&self, body: &[u8]) -> Result<MetricValue, FetchError> {
        let wire: WireMetric =
            serde_json::from_slice(body).map_err(|e| self.invalid(format!("body: {e}")))?;

        let (value, decimals) = fixed::parse_decimal(&wire.value.literal())
            .map_err(|e| self.invalid(format!("value: {e}")))?;

        let timestamp = match wire.timestamp {
            WireTime::Unix(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| self.invalid(format!("timestamp {secs} out of range")))?,
            WireTime::Rfc3339(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| self.invalid(format!("timestamp {text}: {e}")))?,
        };

        if !(0.0..=1.0).contains(&wire.confidence) {
            return Err(self.invalid(format!("confidence {} outside [0, 1]", wire.confidence)));
        }

        Ok(MetricValue::new(value, decimals, self.id.clone(), wire.confidence, timestamp)
            .with_metadata(wire.metadata))
    }
}

#[async_trait]
impl MetricFetcher for HttpMetricFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn can_fetch(&self, subject: &Subject) -> bool {
        self.kinds.contains(&subject.kind) && !subject.key().is_empty()
    }

    async fn fetch_metric(
        &self,
        subject: &Subject,
        at: DateTime<Utc>,
    ) -> Result<MetricValue, FetchError> {
        if !self.can_fetch(subject) {
            return Err(FetchError::Unsupported {
                source_id: self.id.clone(),
                subject: format!("{}:{}", subject.kind, subject.key()),
            });
        }

        let url = self.url(subject);
        let mut request = self
            .client
            .get(&url)
            .query(&[("timestamp", at.timestamp())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_request_error(&e))?;
        if let Some(err) = self.map_status(response.status()) {
            return Err(err);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_request_error(&e))?;

        let metric = self.parse_body(&body)?;
        debug!(source = %self.id, url = %url, value = %metric.display_value(), "Metric fetched");
        Ok(metric)
    }

    async fn is_healthy(&self) -> bool {
        let ping = self
            .client
            .get(&self.base_url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;
        matches!(ping, Ok(response) if !response.status().is_server_error())
    }
}
