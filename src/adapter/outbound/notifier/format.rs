//! Channel-neutral rendering of notification events.

use serde_json::{json, Value};

use crate::port::Event;

/// Stable snake_case name of an event.
#[must_use]
pub fn event_kind(event: &Event) -> &'static str {
    match event {
        Event::MarketIngested { .. } => "market_ingested",
        Event::MarketCommitted(_) => "market_committed",
        Event::MarketResolved { .. } => "market_resolved",
        Event::TransactionFailed(_) => "transaction_failed",
        Event::TransactionTimeout(_) => "transaction_timeout",
        Event::JobFailed(_) => "job_failed",
        Event::AlertFired(_) => "alert_fired",
        Event::AlertResolved(_) => "alert_resolved",
    }
}

/// JSON body for HTTP channels: `{"event": kind, ...fields}`.
#[must_use]
pub fn event_payload(event: &Event) -> Value {
    let mut body = match event {
        Event::MarketIngested {
            market_id,
            subject,
            resolve_at,
        } => json!({
            "market": market_id.to_string(),
            "subject": subject,
            "resolve_at": resolve_at.to_rfc3339(),
        }),
        Event::MarketCommitted(e) => json!({
            "market": e.market_id.to_string(),
            "outcome": e.outcome.as_str(),
            "tx_hash": format!("{:#x}", e.tx_hash),
            "finalize_at": e.finalize_at.to_rfc3339(),
        }),
        Event::MarketResolved {
            market_id,
            outcome,
            tx_hash,
        } => json!({
            "market": market_id.to_string(),
            "outcome": outcome.as_str(),
            "tx_hash": format!("{tx_hash:#x}"),
        }),
        Event::TransactionFailed(e) | Event::TransactionTimeout(e) => json!({
            "market": e.market_id.to_string(),
            "kind": e.kind.to_string(),
            "tx_hash": format!("{:#x}", e.tx_hash),
            "attempts": e.attempts,
        }),
        Event::JobFailed(e) => json!({
            "job": e.job_id.to_string(),
            "job_type": e.job_type.as_str(),
            "market": e.market_id.to_string(),
            "attempts": e.attempts,
            "error": e.error,
        }),
        Event::AlertFired(alert) | Event::AlertResolved(alert) => json!({ "alert": alert }),
    };
    if let Value::Object(map) = &mut body {
        map.insert("event".to_string(), Value::from(event_kind(event)));
    }
    body
}

/// One-line plain-text summary.
#[must_use]
pub fn event_summary(event: &Event) -> String {
    match event {
        Event::MarketIngested {
            market_id,
            subject,
            resolve_at,
        } => format!("Market {market_id} ingested ({subject}), resolves at {resolve_at}"),
        Event::MarketCommitted(e) => format!(
            "Market {} committed {} in {:#x}; finalizable at {}",
            e.market_id, e.outcome, e.tx_hash, e.finalize_at
        ),
        Event::MarketResolved {
            market_id,
            outcome,
            tx_hash,
        } => format!("Market {market_id} resolved {outcome} in {tx_hash:#x}"),
        Event::TransactionFailed(e) => format!(
            "{} transaction {:#x} for {} reverted",
            e.kind, e.tx_hash, e.market_id
        ),
        Event::TransactionTimeout(e) => format!(
            "{} transaction {:#x} for {} not mined after {} attempts",
            e.kind, e.tx_hash, e.market_id, e.attempts
        ),
        Event::JobFailed(e) => format!(
            "{} job {} for {} failed after {} attempts: {}",
            e.job_type, e.job_id, e.market_id, e.attempts, e.error
        ),
        Event::AlertFired(alert) => {
            format!("[{}] {}: {}", alert.severity, alert.key, alert.message)
        }
        Event::AlertResolved(alert) => format!("[resolved] {}", alert.key),
    }
}

/// Truncate a string with ellipsis (Unicode-safe).
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Alert, AlertSeverity, Outcome};
    use crate::port::CommitEvent;
    use crate::testkit::fixtures;
    use alloy_primitives::B256;

    #[test]
    fn commit_payload_carries_kind_and_fields() {
        let event = Event::MarketCommitted(CommitEvent {
            market_id: fixtures::market_id(1),
            outcome: Outcome::Yes,
            tx_hash: B256::repeat_byte(1),
            finalize_at: fixtures::t0(),
        });
        let payload = event_payload(&event);

        assert_eq!(payload["event"], "market_committed");
        assert_eq!(payload["outcome"], "YES");
        assert_eq!(payload["market"], fixtures::market_id(1).to_string());
        assert!(payload["tx_hash"].as_str().unwrap().starts_with("0x0101"));
    }

    #[test]
    fn alert_payload_nests_the_alert() {
        let alert = Alert::fire(
            "component_down:store",
            "component_down",
            AlertSeverity::Critical,
            "store unreachable",
            fixtures::t0(),
        );
        let payload = event_payload(&Event::AlertFired(alert));

        assert_eq!(payload["event"], "alert_fired");
        assert_eq!(payload["alert"]["severity"], "critical");
        assert_eq!(payload["alert"]["key"], "component_down:store");
    }

    #[test]
    fn summary_names_the_market() {
        let event = Event::MarketResolved {
            market_id: fixtures::market_id(2),
            outcome: Outcome::No,
            tx_hash: B256::ZERO,
        };
        let summary = event_summary(&event);
        assert!(summary.contains(&fixtures::market_id(2).to_string()));
        assert!(summary.contains("NO"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello...");
        assert_eq!(truncate("日本語テスト", 3), "日本語...");
    }
}
