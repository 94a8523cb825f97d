//! Alerts raised from health snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Condition holds and nobody has looked at it.
    Active,
    /// An operator has seen it; still counted as open.
    Acknowledged,
    /// Cleared, manually or because the condition went away.
    Resolved,
}

/// One firing of an alert rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// `rule` or `rule:instance`; unique among open alerts.
    pub key: String,
    /// Rule that fired.
    pub rule: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub state: AlertState,
    pub fired_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn fire(
        key: impl Into<String>,
        rule: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            rule: rule.into(),
            severity,
            message: message.into(),
            state: AlertState::Active,
            fired_at: now,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        if self.state == AlertState::Active {
            self.state = AlertState::Acknowledged;
            self.acknowledged_at = Some(now);
        }
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) {
        if self.state != AlertState::Resolved {
            self.state = AlertState::Resolved;
            self.resolved_at = Some(now);
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != AlertState::Resolved
    }
}
