//! Source selection across registered fetchers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::domain::{MetricValue, OracleSpec, Subject};
use crate::error::FetchError;
use crate::port::MetricFetcher;

/// Holds every configured fetcher and picks among them per market.
#[derive(Default, Clone)]
pub struct MetricFetcherRegistry {
    fetchers: Vec<Arc<dyn MetricFetcher>>,
}

impl MetricFetcherRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher. Registration order is the fallback order when a
    /// market names no sources.
    pub fn register(&mut self, fetcher: Arc<dyn MetricFetcher>) {
        self.fetchers.push(fetcher);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn MetricFetcher>> {
        self.fetchers.iter().find(|f| f.id() == id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.fetchers.iter().map(|f| f.id().to_string()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Fetchers to try for a market, in order.
    fn candidates(&self, subject: &Subject, spec: &OracleSpec) -> Vec<&Arc<dyn MetricFetcher>> {
        let primary = spec.primary_source_id.trim();
        let fallback = spec
            .fallback_source_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        if primary.is_empty() && fallback.is_none() {
            return self
                .fetchers
                .iter()
                .filter(|f| f.can_fetch(subject))
                .collect();
        }

        [Some(primary).filter(|id| !id.is_empty()), fallback]
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
            .filter(|f| f.can_fetch(subject))
            .collect()
    }

    /// Fetch from the primary source, falling back to the secondary.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::SourceUnavailable`] when no capable fetcher
    /// exists or every candidate failed.
    pub async fn fetch_metric(
        &self,
        subject: &Subject,
        spec: &OracleSpec,
        at: DateTime<Utc>,
    ) -> Result<MetricValue, FetchError> {
        let candidates = self.candidates(subject, spec);
        if candidates.is_empty() {
            return Err(FetchError::SourceUnavailable {
                subject: subject.to_string(),
                reason: "no capable fetcher".to_string(),
            });
        }

        let mut failures = Vec::new();
        for fetcher in candidates {
            match fetcher.fetch_metric(subject, at).await {
                Ok(value) => {
                    debug!(source = fetcher.id(), subject = %subject, "Metric fetched");
                    return Ok(value);
                }
                Err(err) => {
                    warn!(source = fetcher.id(), subject = %subject, error = %err, "Fetcher failed");
                    failures.push(err.to_string());
                }
            }
        }

        Err(FetchError::SourceUnavailable {
            subject: subject.to_string(),
            reason: failures.join("; "),
        })
    }

    /// Query every capable fetcher concurrently and keep up to
    /// `max_sources` successes in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::SourceUnavailable`] when nothing succeeded.
    pub async fn fetch_metric_multi_source(
        &self,
        subject: &Subject,
        at: DateTime<Utc>,
        max_sources: usize,
    ) -> Result<Vec<MetricValue>, FetchError> {
        let capable: Vec<_> = self
            .fetchers
            .iter()
            .filter(|f| f.can_fetch(subject))
            .collect();
        if capable.is_empty() {
            return Err(FetchError::SourceUnavailable {
                subject: subject.to_string(),
                reason: "no capable fetcher".to_string(),
            });
        }

        let results = join_all(capable.iter().map(|f| f.fetch_metric(subject, at))).await;
        let mut values = Vec::new();
        let mut failures = Vec::new();
        for (fetcher, result) in capable.iter().zip(results) {
            match result {
                Ok(value) => values.push(value),
                Err(err) => {
                    warn!(source = fetcher.id(), subject = %subject, error = %err, "Fetcher failed");
                    failures.push(err.to_string());
                }
            }
        }
        values.truncate(max_sources.max(1));

        if values.is_empty() {
            return Err(FetchError::SourceUnavailable {
                subject: subject.to_string(),
                reason: failures.join("; "),
            });
        }
        Ok(values)
    }

    /// Health of every fetcher by id.
    pub async fn health(&self) -> Vec<(String, bool)> {
        let checks = join_all(self.fetchers.iter().map(|f| f.is_healthy())).await;
        self.fetchers
            .iter()
            .map(|f| f.id().to_string())
            .zip(checks)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubjectKind;
    use crate::testkit::{fixtures, ScriptedFetcher};

    fn spec(primary: &str, fallback: Option<&str>) -> OracleSpec {
        OracleSpec {
            primary_source_id: primary.to_string(),
            fallback_source_id: fallback.map(str::to_string),
            rounding_decimals: 8,
            aggregation: None,
            min_sources: 1,
        }
    }

    fn failing(id: &str) -> ScriptedFetcher {
        ScriptedFetcher::new(id).always(Err(FetchError::Transient {
            source_id: id.into(),
            message: "down".into(),
        }))
    }

    fn serving(id: &str, whole: i64) -> ScriptedFetcher {
        ScriptedFetcher::new(id).always(Ok(fixtures::price_from(id, whole, 0.9)))
    }

    #[tokio::test]
    async fn primary_wins_when_healthy() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(serving("pyth", 3_500)));
        registry.register(Arc::new(serving("coingecko", 3_400)));

        let value = registry
            .fetch_metric(&fixtures::eth_subject(), &spec("pyth", Some("coingecko")), fixtures::t0())
            .await
            .unwrap();
        assert_eq!(value.source, "pyth");
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(failing("pyth")));
        registry.register(Arc::new(serving("coingecko", 3_400)));

        let value = registry
            .fetch_metric(&fixtures::eth_subject(), &spec("pyth", Some("coingecko")), fixtures::t0())
            .await
            .unwrap();
        assert_eq!(value.source, "coingecko");
    }

    #[tokio::test]
    async fn all_failing_is_source_unavailable() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(failing("pyth")));
        registry.register(Arc::new(failing("coingecko")));

        let err = registry
            .fetch_metric(&fixtures::eth_subject(), &spec("pyth", Some("coingecko")), fixtures::t0())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn no_capable_fetcher_is_source_unavailable() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(serving("hl", 1).only(SubjectKind::HlMetric)));

        let err = registry
            .fetch_metric(&fixtures::eth_subject(), &spec("hl", None), fixtures::t0())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn empty_spec_uses_any_capable_fetcher() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(serving("hl", 1).only(SubjectKind::HlMetric)));
        registry.register(Arc::new(serving("coingecko", 3_400)));

        let value = registry
            .fetch_metric(&fixtures::eth_subject(), &spec("", None), fixtures::t0())
            .await
            .unwrap();
        assert_eq!(value.source, "coingecko");
    }

    #[tokio::test]
    async fn unknown_primary_does_not_fall_through_to_others() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(serving("coingecko", 3_400)));

        let err = registry
            .fetch_metric(&fixtures::eth_subject(), &spec("pyth", None), fixtures::t0())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn multi_source_collects_successes() {
        let mut registry = MetricFetcherRegistry::new();
        registry.register(Arc::new(serving("a", 100)));
        registry.register(Arc::new(failing("b")));
        registry.register(Arc::new(serving("c", 300)));
        registry.register(Arc::new(serving("d", 400)));

        let values = registry
            .fetch_metric_multi_source(&fixtures::eth_subject(), fixtures::t0(), 2)
            .await
            .unwrap();
        let sources: Vec<_> = values.iter().map(|v| v.source.as_str()).collect();
        assert_eq!(sources, ["a", "c"]);
    }

    #[tokio::test]
    async fn health_reports_each_fetcher() {
        let mut registry = MetricFetcherRegistry::new();
        let down = serving("b", 1);
        down.set_healthy(false);
        registry.register(Arc::new(serving("a", 1)));
        registry.register(Arc::new(down));

        let health = registry.health().await;
        assert_eq!(health, vec![("a".to_string(), true), ("b".to_string(), false)]);
    }
}
