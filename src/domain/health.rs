//! Component health snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a single component, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    name: String,
    critical: bool,
    status: HealthStatus,
    message: Option<String>,
    detail: Option<f64>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            critical,
            status: HealthStatus::Healthy,
            message: None,
            detail: None,
        }
    }

    pub fn degraded(name: impl Into<String>, critical: bool, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            ..Self::healthy(name, critical)
        }
    }

    pub fn unhealthy(name: impl Into<String>, critical: bool, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            ..Self::healthy(name, critical)
        }
    }

    /// Attach a numeric measurement (queue depth, failure count, ...).
    #[must_use]
    pub fn with_detail(mut self, detail: f64) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn critical(&self) -> bool {
        self.critical
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn detail(&self) -> Option<f64> {
        self.detail
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    components: Vec<ComponentHealth>,
    checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn new(components: Vec<ComponentHealth>, checked_at: DateTime<Utc>) -> Self {
        Self {
            components,
            checked_at,
        }
    }

    pub fn components(&self) -> &[ComponentHealth] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name() == name)
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    /// Worst status among critical components. Non-critical failures
    /// degrade at most.
    pub fn status(&self) -> HealthStatus {
        self.components
            .iter()
            .map(|c| {
                if c.critical() {
                    c.status()
                } else {
                    c.status().min(HealthStatus::Degraded)
                }
            })
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == HealthStatus::Healthy
    }
}
