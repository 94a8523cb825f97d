//! `oracled markets`: inspect stored markets and ingest payloads by hand.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use tabled::Tabled;

use crate::adapter::inbound::cli::output;
use crate::application::ingest::IngestOutcome;
use crate::domain::{format_fixed, Market, MarketId, MetricRecord, Resolution};
use crate::error::{Error, Result};
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::Config;
use crate::port::Store;

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

fn metric_row(record: &MetricRecord) -> MetricRow {
    MetricRow {
        source: record.metric.source.clone(),
        value: record.metric.display_value(),
        confidence: format!("{:.2}", record.metric.confidence),
        observed: timestamp(record.metric.timestamp),
        hash: format!("{:#x}", record.metric.hash),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `value <op> threshold` in the subject's precision.
fn predicate_text(market: &Market) -> String {
    format!(
        "value {} {}",
        market.predicate.op,
        format_fixed(market.predicate.threshold, market.subject.value_decimals)
    )
}

/// Everything stored about one market.
pub struct MarketView {
    pub market: Market,
    pub resolution: Option<Resolution>,
    pub metrics: Vec<MetricRecord>,
}

/// Load a market with its resolution and metric audit trail.
pub async fn load_view(store: &dyn Store, id: &MarketId) -> Result<MarketView> {
    let market = store
        .get_market(id)
        .await?
        .ok_or(Error::MarketNotFound(*id))?;
    let resolution = store.get_resolution(id).await?;
    let metrics = store.metrics_for_market(id).await?;
    Ok(MarketView {
        market,
        resolution,
        metrics,
    })
}

/// Show a stored market.
pub async fn execute_show<P: AsRef<Path>>(config_path: P, id: MarketId) -> Result<()> {
    let config = Config::load(config_path.as_ref())?;
    let store = bootstrap::open_store(&config.database)?;
    let view = load_view(store.as_ref(), &id).await?;
    render(&view)
}

fn render(view: &MarketView) -> Result<()> {
    let market = &view.market;

    if output::is_json() {
        output::json_output(json!({
            "command": "markets.show",
            "market": serde_json::to_value(market)?,
            "resolution": serde_json::to_value(&view.resolution)?,
            "metrics": serde_json::to_value(&view.metrics)?,
        }));
        return Ok(());
    }

    output::section("Market");
    output::field("Address", market.id);
    if !market.title.is_empty() {
        output::field("Title", &market.title);
    }
    output::field("Status", output::highlight(market.status));
    output::field("Subject", &market.subject);
    output::field("Predicate", predicate_text(market));
    output::field("Window", format!("{} .. {}", timestamp(market.window.t_start), timestamp(market.window.t_end)));
    output::field("Primary", &market.oracle_spec.primary_source_id);
    if let Some(fallback) = &market.oracle_spec.fallback_source_id {
        output::field("Fallback", fallback);
    }
    if output::verbosity() > 0 {
        output::field("Creator", &market.creator);
        output::field("Type", &market.market_type);
        if let Some(event) = &market.source_event {
            output::field("Event", event.as_str());
        }
    }

    match &view.resolution {
        Some(resolution) => {
            output::section("Resolution");
            output::field("Outcome", output::highlight(resolution.outcome));
            output::field("Value", format_fixed(resolution.value, resolution.decimals));
            output::field("Source", &resolution.source);
            output::field("Data hash", format!("{:#x}", resolution.data_hash));
            output::field("Resolved", timestamp(resolution.resolved_at));
            if let Some(tx) = resolution.commit_tx_hash {
                output::field("Commit tx", format!("{tx:#x}"));
            }
            if let Some(tx) = resolution.finalize_tx_hash {
                output::field("Finalize tx", format!("{tx:#x}"));
            }
        }
        None => output::note("Not resolved yet"),
    }

    if !view.metrics.is_empty() {
        output::section("Metric audit");
        output::table(view.metrics.iter().map(metric_row).collect());
    }
    Ok(())
}

fn read_payload(file: &Path) -> Result<Vec<u8>> {
    if file == Path::new("-") {
        let mut body = Vec::new();
        std::io::stdin().read_to_end(&mut body)?;
        return Ok(body);
    }
    Ok(std::fs::read(file)?)
}

/// Push one webhook payload through the ingestion pipeline.
#[cfg(feature = "evm")]
pub async fn execute_ingest<P: AsRef<Path>>(config_path: P, file: &Path) -> Result<()> {
    let config = Config::load(config_path.as_ref())?;
    let body = read_payload(file)?;
    let services = bootstrap::connect(&config).await?;
    let outcome = services.webhook().deliver(&body).await?;
    report_ingest(&outcome);
    Ok(())
}

#[cfg(not(feature = "evm"))]
pub async fn execute_ingest<P: AsRef<Path>>(config_path: P, file: &Path) -> Result<()> {
    Config::load(config_path.as_ref())?;
    read_payload(file)?;
    Err(Error::Config(crate::error::ConfigError::Other(
        "ingestion needs the evm feature".into(),
    )))
}

fn report_ingest(outcome: &IngestOutcome) {
    if output::is_json() {
        let detail = match outcome {
            IngestOutcome::Ingested {
                market_id,
                created,
                job,
            } => json!({ "market": market_id, "created": created, "job": job }),
            IngestOutcome::Foreign(address) => json!({ "contract": address }),
            IngestOutcome::AlreadyResolved(market) => json!({ "market": market }),
            IngestOutcome::Malformed(reason) | IngestOutcome::Deferred(reason) => {
                json!({ "reason": reason })
            }
            IngestOutcome::Duplicate => json!({}),
        };
        output::json_output(json!({
            "command": "markets.ingest",
            "outcome": outcome.label(),
            "detail": detail,
        }));
        return;
    }

    match outcome {
        IngestOutcome::Ingested {
            market_id,
            created: true,
            job,
        } => {
            output::success(&format!("Ingested market {}", output::highlight(market_id)));
            if let Some(job) = job {
                output::field("Resolve job", job);
            }
        }
        IngestOutcome::Ingested { market_id, .. } => {
            output::note(&format!("Market {market_id} was already known"));
        }
        IngestOutcome::Duplicate => output::note("Event already processed"),
        IngestOutcome::Foreign(address) => {
            output::warning(&format!("Event emitted by foreign contract {address}"));
        }
        IngestOutcome::Malformed(reason) => output::warning(&format!("Malformed event: {reason}")),
        IngestOutcome::AlreadyResolved(market) => {
            output::note(&format!("Market {market} is already resolved on-chain"));
        }
        IngestOutcome::Deferred(reason) => {
            output::warning(&format!("Chain read failed; event deferred: {reason}"));
        }
    }
}
