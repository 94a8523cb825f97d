//! Reliability decorator for any [`MetricFetcher`].
//!
//! Wraps a fetcher with a timeout race, bounded exponential-backoff retries
//! on transient errors, a short-TTL result cache keyed by
//! `(subject, timestamp)` and a minimum spacing between upstream calls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::domain::{MetricValue, Subject};
use crate::error::FetchError;
use crate::port::MetricFetcher;

/// Consecutive failures after which the fetcher reports itself unhealthy.
const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Timeout, retry, cache and throttle settings for one fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Per-call timeout (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay (milliseconds).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// How long a successful result is served from cache (seconds).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Minimum delay between upstream calls (milliseconds).
    #[serde(default)]
    pub min_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4_000
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            min_interval_ms: 0,
        }
    }
}

type CacheKey = (String, i64);

/// Decorator adding timeout, retry, caching and throttling to a fetcher.
pub struct ResilientFetcher<F> {
    inner: F,
    config: ResilienceConfig,
    cache: DashMap<CacheKey, (Instant, MetricValue)>,
    /// Time of the last upstream call; held across the throttle sleep so
    /// concurrent callers queue up.
    last_call: Mutex<Option<Instant>>,
    consecutive_failures: AtomicU32,
}

impl<F: MetricFetcher> ResilientFetcher<F> {
    pub fn new(inner: F, config: ResilienceConfig) -> Self {
        Self {
            inner,
            config,
            cache: DashMap::new(),
            last_call: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Drop expired cache entries.
    pub fn purge_expired(&self) {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        self.cache.retain(|_, (stored, _)| stored.elapsed() < ttl);
    }

    /// Insert a fresh result after evicting expired ones.
    fn remember(&self, key: CacheKey, value: &MetricValue) {
        self.purge_expired();
        self.cache.insert(key, (Instant::now(), value.clone()));
    }

    fn cached(&self, key: &CacheKey) -> Option<MetricValue> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let entry = self.cache.get(key)?;
        let (stored, value) = entry.value();
        (stored.elapsed() < ttl).then(|| value.clone())
    }

    /// Exponential delay for the given retry with up to 20% jitter.
    fn backoff(&self, retry: u32) -> Duration {
        let base = self
            .config
            .initial_backoff_ms
            .saturating_mul(1u64 << retry.min(16))
            .min(self.config.max_backoff_ms);
        let jitter_range = base / 5;
        let jitter = if jitter_range == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_range)
        };
        Duration::from_millis(base + jitter)
    }

    async fn throttle(&self) {
        let min_interval = Duration::from_millis(self.config.min_interval_ms);
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn attempt(&self, subject: &Subject, at: DateTime<Utc>) -> Result<MetricValue, FetchError> {
        self.throttle().await;
        let limit = Duration::from_millis(self.config.timeout_ms);
        match timeout(limit, self.inner.fetch_metric(subject, at)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                source_id: self.inner.id().to_string(),
                after: limit,
            }),
        }
    }
}

#[async_trait]
impl<F: MetricFetcher> MetricFetcher for ResilientFetcher<F> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn can_fetch(&self, subject: &Subject) -> bool {
        self.inner.can_fetch(subject)
    }

    async fn fetch_metric(
        &self,
        subject: &Subject,
        at: DateTime<Utc>,
    ) -> Result<MetricValue, FetchError> {
        if !self.inner.can_fetch(subject) {
            return Err(FetchError::Unsupported {
                source_id: self.inner.id().to_string(),
                subject: subject.to_string(),
            });
        }

        let key = (subject.to_string(), at.timestamp_millis());
        if let Some(hit) = self.cached(&key) {
            debug!(source = self.inner.id(), subject = %subject, "Metric cache hit");
            return Ok(hit);
        }

        let mut retry = 0;
        loop {
            match self.attempt(subject, at).await {
                Ok(value) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    self.remember(key, &value);
                    return Ok(value);
                }
                Err(err) if err.is_transient() && retry < self.config.max_retries => {
                    let delay = self.backoff(retry);
                    warn!(
                        source = self.inner.id(),
                        subject = %subject,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient fetch failure, retrying"
                    );
                    sleep(delay).await;
                    retry += 1;
                }
                Err(err) => {
                    self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                    return Err(err);
                }
            }
        }
    }

    async fn is_healthy(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < UNHEALTHY_AFTER_FAILURES
            && self.inner.is_healthy().await
    }
}
