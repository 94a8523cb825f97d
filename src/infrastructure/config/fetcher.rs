//! `[[fetchers]]` entries: one HTTP data source each.

use serde::Deserialize;

use crate::application::metric::ResilienceConfig;
use crate::domain::SubjectKind;

/// One metric data source.
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Identifier referenced by markets' `primary_source_id`.
    pub id: String,
    /// Endpoint root; requests go to `{base_url}/{kind}/{key}`.
    pub base_url: String,
    /// Subject kinds this source serves.
    #[serde(default = "default_kinds")]
    pub kinds: Vec<SubjectKind>,
    /// Name of the environment variable holding the API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Resolved from `api_key_env` at load time.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Timeout, retry, cache and throttle settings.
    #[serde(flatten)]
    pub resilience: ResilienceConfig,
}

fn default_kinds() -> Vec<SubjectKind> {
    vec![SubjectKind::TokenPrice, SubjectKind::HlMetric]
}
