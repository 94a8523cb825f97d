//! Metric data source port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{MetricValue, Subject};
use crate::error::FetchError;

/// A single external data source.
///
/// Implementations are capability-scoped: the registry only asks a fetcher
/// for subjects it claims through [`MetricFetcher::can_fetch`].
#[async_trait]
pub trait MetricFetcher: Send + Sync {
    /// Stable identifier referenced by `OracleSpec` source ids.
    fn id(&self) -> &str;

    /// Whether this source knows the subject.
    fn can_fetch(&self, subject: &Subject) -> bool;

    /// Fetch the subject's value as of `at`.
    async fn fetch_metric(
        &self,
        subject: &Subject,
        at: DateTime<Utc>,
    ) -> Result<MetricValue, FetchError>;

    /// Whether the source is currently answering.
    async fn is_healthy(&self) -> bool;
}
