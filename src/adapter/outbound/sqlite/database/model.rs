//! Database model types for Diesel ORM.

use diesel::prelude::*;

use super::schema::{jobs, markets, metric_data, resolutions};

/// Database row for a market.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = markets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketRow {
    pub id: String,
    pub title: String,
    pub creator: String,
    pub market_type: String,
    pub subject: String,
    pub predicate: String,
    pub resolution_window: String,
    pub oracle_spec: String,
    pub economics: String,
    pub cutoff_time: i64,
    pub t_end: i64,
    pub status: String,
    pub resolve_time: Option<i64>,
    pub source_event: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Database row for a job.
#[derive(Queryable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct JobRow {
    pub id: String,
    pub job_type: String,
    pub market_id: String,
    pub status: String,
    pub scheduled_for: i64,
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: String,
    pub result: Option<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Database row for a resolution.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = resolutions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ResolutionRow {
    pub market_id: String,
    pub outcome: String,
    pub value: String,
    pub decimals: i32,
    pub source: String,
    pub confidence: f64,
    pub data_hash: String,
    pub resolved_at: i64,
    pub submitted_at: i64,
    pub commit_tx_hash: Option<String>,
    pub committed_at: Option<i64>,
    pub finalize_tx_hash: Option<String>,
    pub finalized_at: Option<i64>,
}

/// Database row for an audit record (insertable).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = metric_data)]
pub struct NewMetricRow {
    pub market_id: String,
    pub value: String,
    pub decimals: i32,
    pub source: String,
    pub confidence: f64,
    pub observed_at: i64,
    pub hash: String,
    pub metadata: String,
    pub fetched_at: i64,
}

/// Database row for an audit record (queryable).
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = metric_data)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MetricRow {
    pub id: Option<i32>,
    pub market_id: String,
    pub value: String,
    pub decimals: i32,
    pub source: String,
    pub confidence: f64,
    pub observed_at: i64,
    pub hash: String,
    pub metadata: String,
    pub fetched_at: i64,
}
