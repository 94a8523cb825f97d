//! SQLite implementation of every store port.

use std::str::FromStr;

use alloy_primitives::B256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use super::database::connection::DbPool;
use super::database::model::{JobRow, MarketRow, MetricRow, NewMetricRow, ResolutionRow};
use super::database::schema::{jobs, markets, metric_data, resolutions};
use crate::domain::{
    fixed, EventKey, Job, JobId, JobStatus, JobType, Market, MarketId, MarketStatus, MetricRecord,
    MetricValue, Outcome, Resolution,
};
use crate::error::{Error, Result};
use crate::port::{JobStore, MarketStore, MetricAuditStore, ResolutionStore, Store};

type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| Error::Parse(format!("timestamp {ms} out of range")))
}

fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::Parse(format!("{field} {value} out of range")))
}

fn to_u32(value: i32, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Parse(format!("{field} {value} out of range")))
}

fn to_u8(value: i32, field: &str) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::Parse(format!("{field} {value} out of range")))
}

fn parse_hash(value: &str) -> Result<B256> {
    B256::from_str(value).map_err(|e| Error::Parse(format!("hash {value}: {e}")))
}

fn market_to_row(market: &Market) -> Result<MarketRow> {
    Ok(MarketRow {
        id: market.id.to_string(),
        title: market.title.clone(),
        creator: market.creator.clone(),
        market_type: market.market_type.clone(),
        subject: serde_json::to_string(&market.subject)?,
        predicate: serde_json::to_string(&market.predicate)?,
        resolution_window: serde_json::to_string(&market.window)?,
        oracle_spec: serde_json::to_string(&market.oracle_spec)?,
        economics: serde_json::to_string(&market.economics)?,
        cutoff_time: millis(market.cutoff_time),
        t_end: millis(market.window.t_end),
        status: market.status.as_str().to_string(),
        resolve_time: market.resolve_time.map(millis),
        source_event: market.source_event.as_ref().map(|k| k.as_str().to_string()),
        created_at: millis(market.created_at),
        updated_at: millis(market.updated_at),
    })
}

fn market_from_row(row: MarketRow) -> Result<Market> {
    Ok(Market {
        id: row.id.parse()?,
        title: row.title,
        creator: row.creator,
        market_type: row.market_type,
        subject: serde_json::from_str(&row.subject)?,
        predicate: serde_json::from_str(&row.predicate)?,
        window: serde_json::from_str(&row.resolution_window)?,
        oracle_spec: serde_json::from_str(&row.oracle_spec)?,
        economics: serde_json::from_str(&row.economics)?,
        cutoff_time: from_millis(row.cutoff_time)?,
        status: row.status.parse()?,
        resolve_time: opt_from_millis(row.resolve_time)?,
        source_event: row.source_event.map(EventKey::from),
        created_at: from_millis(row.created_at)?,
        updated_at: from_millis(row.updated_at)?,
    })
}

fn job_to_row(job: &Job) -> Result<JobRow> {
    Ok(JobRow {
        id: job.id.to_string(),
        job_type: job.job_type.as_str().to_string(),
        market_id: job.market_id.to_string(),
        status: job.status.as_str().to_string(),
        scheduled_for: millis(job.scheduled_for),
        attempts: to_i32(job.attempts, "attempts")?,
        max_attempts: to_i32(job.max_attempts, "max_attempts")?,
        payload: job.payload.to_string(),
        result: job.result.as_ref().map(ToString::to_string),
        last_error: job.last_error.clone(),
        created_at: millis(job.created_at),
        updated_at: millis(job.updated_at),
        started_at: job.started_at.map(millis),
        completed_at: job.completed_at.map(millis),
    })
}

fn job_from_row(row: JobRow) -> Result<Job> {
    Ok(Job {
        id: row.id.parse()?,
        job_type: row.job_type.parse()?,
        market_id: row.market_id.parse()?,
        status: row.status.parse()?,
        scheduled_for: from_millis(row.scheduled_for)?,
        attempts: to_u32(row.attempts, "attempts")?,
        max_attempts: to_u32(row.max_attempts, "max_attempts")?,
        payload: serde_json::from_str(&row.payload)?,
        result: row.result.as_deref().map(serde_json::from_str).transpose()?,
        last_error: row.last_error,
        created_at: from_millis(row.created_at)?,
        updated_at: from_millis(row.updated_at)?,
        started_at: opt_from_millis(row.started_at)?,
        completed_at: opt_from_millis(row.completed_at)?,
    })
}

fn resolution_to_row(resolution: &Resolution) -> ResolutionRow {
    ResolutionRow {
        market_id: resolution.market_id.to_string(),
        outcome: resolution.outcome.as_str().to_string(),
        value: resolution.value.to_string(),
        decimals: i32::from(resolution.decimals),
        source: resolution.source.clone(),
        confidence: resolution.confidence,
        data_hash: format!("{:#x}", resolution.data_hash),
        resolved_at: millis(resolution.resolved_at),
        submitted_at: millis(resolution.submitted_at),
        commit_tx_hash: resolution.commit_tx_hash.map(|h| format!("{h:#x}")),
        committed_at: resolution.committed_at.map(millis),
        finalize_tx_hash: resolution.finalize_tx_hash.map(|h| format!("{h:#x}")),
        finalized_at: resolution.finalized_at.map(millis),
    }
}

fn resolution_from_row(row: ResolutionRow) -> Result<Resolution> {
    Ok(Resolution {
        market_id: row.market_id.parse()?,
        outcome: Outcome::from_str(&row.outcome)?,
        value: fixed::parse_integer(&row.value)?,
        decimals: to_u8(row.decimals, "decimals")?,
        source: row.source,
        confidence: row.confidence,
        data_hash: parse_hash(&row.data_hash)?,
        resolved_at: from_millis(row.resolved_at)?,
        submitted_at: from_millis(row.submitted_at)?,
        commit_tx_hash: row.commit_tx_hash.as_deref().map(parse_hash).transpose()?,
        committed_at: opt_from_millis(row.committed_at)?,
        finalize_tx_hash: row.finalize_tx_hash.as_deref().map(parse_hash).transpose()?,
        finalized_at: opt_from_millis(row.finalized_at)?,
    })
}

fn metric_to_row(record: &MetricRecord) -> NewMetricRow {
    let metric = &record.metric;
    NewMetricRow {
        market_id: record.market_id.to_string(),
        value: metric.value.to_string(),
        decimals: i32::from(metric.decimals),
        source: metric.source.clone(),
        confidence: metric.confidence,
        observed_at: millis(metric.timestamp),
        hash: format!("{:#x}", metric.hash),
        metadata: metric.metadata.to_string(),
        fetched_at: millis(record.fetched_at),
    }
}

fn metric_from_row(row: MetricRow) -> Result<MetricRecord> {
    Ok(MetricRecord {
        market_id: row.market_id.parse()?,
        metric: MetricValue {
            value: fixed::parse_integer(&row.value)?,
            decimals: to_u8(row.decimals, "decimals")?,
            source: row.source,
            confidence: row.confidence,
            timestamp: from_millis(row.observed_at)?,
            hash: parse_hash(&row.hash)?,
            metadata: serde_json::from_str(&row.metadata)?,
        },
        fetched_at: from_millis(row.fetched_at)?,
    })
}

/// SQLite-backed store.
///
/// Implements every persistence port over one connection pool.
pub struct SqliteStore {
    /// Database connection pool.
    pool: DbPool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection pool.
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<Conn> {
        self.pool
            .get()
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

#[async_trait]
impl MarketStore for SqliteStore {
    async fn insert_market(&self, market: &Market) -> Result<bool> {
        let row = market_to_row(market)?;
        let mut conn = self.conn()?;

        let inserted = diesel::insert_or_ignore_into(markets::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(inserted > 0)
    }

    async fn get_market(&self, id: &MarketId) -> Result<Option<Market>> {
        let mut conn = self.conn()?;

        let row: Option<MarketRow> = markets::table
            .find(id.to_string())
            .select(MarketRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(market_from_row).transpose()
    }

    async fn update_market_status(
        &self,
        id: &MarketId,
        status: MarketStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;

        let updated = diesel::update(markets::table.find(id.to_string()))
            .set((
                markets::status.eq(status.as_str()),
                markets::updated_at.eq(millis(now)),
            ))
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::MarketNotFound(*id));
        }
        Ok(())
    }

    async fn markets_by_status(&self, status: MarketStatus) -> Result<Vec<Market>> {
        let mut conn = self.conn()?;

        let rows: Vec<MarketRow> = markets::table
            .filter(markets::status.eq(status.as_str()))
            .order(markets::created_at.asc())
            .select(MarketRow::as_select())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(market_from_row).collect()
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        let row = job_to_row(job)?;
        let mut conn = self.conn()?;

        diesel::insert_into(jobs::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let mut conn = self.conn()?;

        let row: Option<JobRow> = jobs::table
            .find(id.to_string())
            .select(JobRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(job_from_row).transpose()
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let row = job_to_row(job)?;
        let mut conn = self.conn()?;

        let updated = diesel::update(jobs::table.find(&row.id))
            .set(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::JobNotFound(row.id));
        }
        Ok(())
    }

    async fn claim_next_job(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut conn = self.conn()?;
        let now_ms = millis(now);
        let claimable = vec![JobStatus::Pending.as_str(), JobStatus::Retrying.as_str()];

        // BEGIN IMMEDIATE takes the write lock up front, so two workers
        // cannot select the same row.
        let claimed = conn
            .immediate_transaction(|conn| {
                let next: Option<JobRow> = jobs::table
                    .filter(jobs::status.eq_any(claimable))
                    .filter(jobs::scheduled_for.le(now_ms))
                    .order((jobs::scheduled_for.asc(), jobs::created_at.asc()))
                    .select(JobRow::as_select())
                    .first(conn)
                    .optional()?;
                let Some(mut row) = next else {
                    return Ok(None);
                };

                diesel::update(jobs::table.find(&row.id))
                    .set((
                        jobs::status.eq(JobStatus::Processing.as_str()),
                        jobs::started_at.eq(Some(now_ms)),
                        jobs::updated_at.eq(now_ms),
                    ))
                    .execute(conn)?;

                row.status = JobStatus::Processing.as_str().to_string();
                row.started_at = Some(now_ms);
                row.updated_at = now_ms;
                Ok::<_, diesel::result::Error>(Some(row))
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        claimed.map(job_from_row).transpose()
    }

    async fn find_stale_jobs(&self, started_before: DateTime<Utc>) -> Result<Vec<Job>> {
        let mut conn = self.conn()?;

        let rows: Vec<JobRow> = jobs::table
            .filter(jobs::status.eq(JobStatus::Processing.as_str()))
            .filter(jobs::started_at.lt(millis(started_before)))
            .select(JobRow::as_select())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn list_jobs(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<Job>> {
        let mut conn = self.conn()?;

        let mut query = jobs::table
            .select(JobRow::as_select())
            .order(jobs::updated_at.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(jobs::status.eq(status.as_str()));
        }
        let rows: Vec<JobRow> = query
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn has_open_job(&self, market: &MarketId, job_type: JobType) -> Result<bool> {
        let mut conn = self.conn()?;
        let open = vec![
            JobStatus::Pending.as_str(),
            JobStatus::Processing.as_str(),
            JobStatus::Retrying.as_str(),
        ];

        let count: i64 = jobs::table
            .filter(jobs::market_id.eq(market.to_string()))
            .filter(jobs::job_type.eq(job_type.as_str()))
            .filter(jobs::status.eq_any(open))
            .count()
            .get_result(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count > 0)
    }

    async fn jobs_for_market(&self, market: &MarketId, job_type: JobType) -> Result<Vec<Job>> {
        let mut conn = self.conn()?;

        let rows: Vec<JobRow> = jobs::table
            .filter(jobs::market_id.eq(market.to_string()))
            .filter(jobs::job_type.eq(job_type.as_str()))
            .order(jobs::created_at.asc())
            .select(JobRow::as_select())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn job_counts(&self) -> Result<Vec<(JobStatus, u64)>> {
        let mut conn = self.conn()?;

        let rows: Vec<(String, i64)> = jobs::table
            .group_by(jobs::status)
            .select((jobs::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter()
            .map(|(status, count)| {
                Ok((
                    status.parse::<JobStatus>()?,
                    u64::try_from(count).unwrap_or_default(),
                ))
            })
            .collect()
    }

    async fn prune_jobs(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let live_statuses = vec![MarketStatus::Active.as_str(), MarketStatus::Committed.as_str()];

        let deleted = conn
            .immediate_transaction(|conn| {
                let live: Vec<String> = markets::table
                    .filter(markets::status.eq_any(live_statuses))
                    .select(markets::id)
                    .load(conn)?;

                diesel::delete(
                    jobs::table
                        .filter(
                            jobs::status.eq(JobStatus::Completed.as_str()).or(jobs::status
                                .eq(JobStatus::Failed.as_str())
                                .and(jobs::market_id.ne_all(live))),
                        )
                        .filter(jobs::updated_at.lt(millis(older_than))),
                )
                .execute(conn)
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(deleted)
    }
}

#[async_trait]
impl ResolutionStore for SqliteStore {
    async fn save_resolution(&self, resolution: &Resolution) -> Result<()> {
        let row = resolution_to_row(resolution);
        let mut conn = self.conn()?;

        diesel::replace_into(resolutions::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_resolution(&self, market: &MarketId) -> Result<Option<Resolution>> {
        let mut conn = self.conn()?;

        let row: Option<ResolutionRow> = resolutions::table
            .find(market.to_string())
            .select(ResolutionRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        row.map(resolution_from_row).transpose()
    }
}

#[async_trait]
impl MetricAuditStore for SqliteStore {
    async fn record_metric(&self, record: &MetricRecord) -> Result<()> {
        let row = metric_to_row(record);
        let mut conn = self.conn()?;

        diesel::insert_into(metric_data::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn metrics_for_market(&self, market: &MarketId) -> Result<Vec<MetricRecord>> {
        let mut conn = self.conn()?;

        let rows: Vec<MetricRow> = metric_data::table
            .filter(metric_data::market_id.eq(market.to_string()))
            .order(metric_data::id.asc())
            .select(MetricRow::as_select())
            .load(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(metric_from_row).collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::sqlite::database::connection::{create_pool, run_migrations};
    use crate::testkit::fixtures;
    use chrono::Duration;
    use serde_json::json;

    fn store() -> SqliteStore {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        SqliteStore::new(pool)
    }

    fn job(market: u64, offset_secs: i64) -> Job {
        Job::new(
            JobType::ResolveMarket,
            fixtures::market_id(market),
            json!({ "market": market }),
            fixtures::t0() + Duration::seconds(offset_secs),
            5,
            fixtures::t0(),
        )
    }

    #[tokio::test]
    async fn market_round_trips_and_insert_is_idempotent() {
        let store = store();
        let mut market = fixtures::market(1);
        market.source_event = Some(EventKey::from("0xab:0".to_string()));
        market.resolve_time = Some(fixtures::t0());

        assert!(store.insert_market(&market).await.unwrap());
        let mut changed = market.clone();
        changed.title = "overwritten".into();
        assert!(!store.insert_market(&changed).await.unwrap());

        let loaded = store.get_market(&market.id).await.unwrap().unwrap();
        assert_eq!(loaded, market);
    }

    #[tokio::test]
    async fn status_update_moves_market_between_lists() {
        let store = store();
        let market = fixtures::market(1);
        store.insert_market(&market).await.unwrap();

        store
            .update_market_status(&market.id, MarketStatus::Committed, fixtures::t0())
            .await
            .unwrap();

        assert!(store
            .markets_by_status(MarketStatus::Active)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .markets_by_status(MarketStatus::Committed)
                .await
                .unwrap()
                .len(),
            1
        );
        let missing = store
            .update_market_status(&fixtures::market_id(9), MarketStatus::Resolved, fixtures::t0())
            .await;
        assert!(matches!(missing, Err(Error::MarketNotFound(_))));
    }

    #[tokio::test]
    async fn claim_takes_earliest_due_job_once() {
        let store = store();
        let later = job(1, 60);
        let sooner = job(2, 0);
        let future = job(3, 3_600);
        for j in [&later, &sooner, &future] {
            store.insert_job(j).await.unwrap();
        }
        let now = fixtures::t0() + Duration::seconds(120);

        let first = store.claim_next_job(now).await.unwrap().unwrap();
        assert_eq!(first.id, sooner.id);
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.started_at, Some(now));

        let second = store.claim_next_job(now).await.unwrap().unwrap();
        assert_eq!(second.id, later.id);
        assert!(store.claim_next_job(now).await.unwrap().is_none());

        let stored = store.get_job(&sooner.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn job_updates_and_counts() {
        let store = store();
        let mut j = job(1, 0);
        store.insert_job(&j).await.unwrap();
        assert!(store
            .has_open_job(&j.market_id, JobType::ResolveMarket)
            .await
            .unwrap());

        j.status = JobStatus::Failed;
        j.attempts = 5;
        j.last_error = Some("rpc down".into());
        j.result = Some(json!({ "ok": false }));
        store.update_job(&j).await.unwrap();

        let loaded = store.get_job(&j.id).await.unwrap().unwrap();
        assert_eq!(loaded, j);
        assert!(!store
            .has_open_job(&j.market_id, JobType::ResolveMarket)
            .await
            .unwrap());
        assert_eq!(
            store.job_counts().await.unwrap(),
            vec![(JobStatus::Failed, 1)]
        );
        assert_eq!(
            store
                .list_jobs(Some(JobStatus::Failed), 10)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .list_jobs(Some(JobStatus::Pending), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn prune_removes_only_old_finished_jobs() {
        let store = store();
        let mut done = job(1, 0);
        done.status = JobStatus::Completed;
        let open = job(2, 0);
        store.insert_job(&done).await.unwrap();
        store.insert_job(&open).await.unwrap();

        let removed = store
            .prune_jobs(fixtures::t0() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_job(&open.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_job_of_live_market_survives_prune() {
        let store = store();
        let live = fixtures::market(1);
        let mut settled = fixtures::market(2);
        settled.status = MarketStatus::Resolved;
        store.insert_market(&live).await.unwrap();
        store.insert_market(&settled).await.unwrap();

        let mut kept = job(1, 0);
        kept.status = JobStatus::Failed;
        let mut dropped = job(2, 0);
        dropped.status = JobStatus::Failed;
        store.insert_job(&kept).await.unwrap();
        store.insert_job(&dropped).await.unwrap();

        let removed = store
            .prune_jobs(fixtures::t0() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_job(&kept.id).await.unwrap().is_some());
        assert!(store.get_job(&dropped.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn jobs_for_market_filters_by_type() {
        let store = store();
        let resolve = job(1, 0);
        let mut finalize = job(1, 10);
        finalize.job_type = JobType::FinalizeMarket;
        store.insert_job(&resolve).await.unwrap();
        store.insert_job(&finalize).await.unwrap();
        store.insert_job(&job(2, 0)).await.unwrap();

        let found = store
            .jobs_for_market(&fixtures::market_id(1), JobType::ResolveMarket)
            .await
            .unwrap();
        assert_eq!(found, vec![resolve]);
    }

    #[tokio::test]
    async fn stale_processing_jobs_are_found() {
        let store = store();
        store.insert_job(&job(1, 0)).await.unwrap();
        store.claim_next_job(fixtures::t0()).await.unwrap();

        let stale = store
            .find_stale_jobs(fixtures::t0() + Duration::minutes(20))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert!(store
            .find_stale_jobs(fixtures::t0())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn resolution_is_replaced() {
        let store = store();
        let market = fixtures::market_id(1);
        let mut resolution = Resolution::new(
            market,
            Outcome::Yes,
            &fixtures::eth_price(3_500, 0.95),
            fixtures::t0(),
        );
        store.save_resolution(&resolution).await.unwrap();

        resolution.commit_tx_hash = Some(B256::repeat_byte(7));
        resolution.committed_at = Some(fixtures::t0() + Duration::minutes(1));
        store.save_resolution(&resolution).await.unwrap();

        let loaded = store.get_resolution(&market).await.unwrap().unwrap();
        assert_eq!(loaded, resolution);
    }

    #[tokio::test]
    async fn audit_log_keeps_insertion_order() {
        let store = store();
        let market = fixtures::market_id(1);
        for (source, price) in [("pyth", 3_500), ("chainlink", 3_490)] {
            let metric = fixtures::price_from(source, price, 0.9)
                .with_metadata(json!({ "feed": source }));
            store
                .record_metric(&MetricRecord {
                    market_id: market,
                    metric,
                    fetched_at: fixtures::t0(),
                })
                .await
                .unwrap();
        }

        let records = store.metrics_for_market(&market).await.unwrap();
        let sources: Vec<&str> = records.iter().map(|r| r.metric.source.as_str()).collect();
        assert_eq!(sources, ["pyth", "chainlink"]);
        assert!(records.iter().all(|r| r.metric.verify_hash()));
        assert_eq!(records[0].metric.metadata["feed"], "pyth");
    }

    #[tokio::test]
    async fn ping_succeeds() {
        store().ping().await.unwrap();
    }
}
