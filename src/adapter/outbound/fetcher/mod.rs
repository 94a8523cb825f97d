//! Metric data source adapters.

pub mod http;

pub use http::HttpMetricFetcher;
