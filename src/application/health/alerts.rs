//! Rule-based alerting over health snapshots.
//!
//! Rules are fixed:
//!
//! | rule                 | fires when                                 | severity                   |
//! |----------------------|--------------------------------------------|----------------------------|
//! | `system_unhealthy`   | aggregate status is unhealthy              | critical                   |
//! | `component_down`     | a component is unhealthy                   | critical / warning         |
//! | `component_degraded` | a component is degraded                    | warning                    |
//!
//! Each alert key fires at most once per cooldown. An open alert whose
//! condition no longer holds is resolved on the next evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{Alert, AlertSeverity, HealthReport, HealthStatus};
use crate::port::{Clock, Event, Notifier};

/// Alert dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum seconds between two firings of the same alert key.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown_secs() -> u64 {
    900
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// A condition found in a report.
struct Finding {
    key: String,
    rule: &'static str,
    severity: AlertSeverity,
    message: String,
}

fn findings(report: &HealthReport) -> Vec<Finding> {
    let mut out = Vec::new();
    if report.status() == HealthStatus::Unhealthy {
        out.push(Finding {
            key: "system_unhealthy".to_string(),
            rule: "system_unhealthy",
            severity: AlertSeverity::Critical,
            message: "one or more critical components are unhealthy".to_string(),
        });
    }
    for component in report.components() {
        let message = component.message().unwrap_or("no detail").to_string();
        match component.status() {
            HealthStatus::Healthy => {}
            HealthStatus::Unhealthy => out.push(Finding {
                key: format!("component_down:{}", component.name()),
                rule: "component_down",
                severity: if component.critical() {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
                message: format!("{} is unhealthy: {message}", component.name()),
            }),
            HealthStatus::Degraded => out.push(Finding {
                key: format!("component_degraded:{}", component.name()),
                rule: "component_degraded",
                severity: AlertSeverity::Warning,
                message: format!("{} is degraded: {message}", component.name()),
            }),
        }
    }
    out
}

#[derive(Default)]
struct State {
    open: HashMap<String, Alert>,
    last_fired: HashMap<String, DateTime<Utc>>,
}

/// Owns open alerts and per-key cooldowns; dispatches through a notifier.
pub struct AlertManager {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: AlertConfig,
    state: Mutex<State>,
}

impl AlertManager {
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, config: AlertConfig) -> Self {
        Self {
            notifier,
            clock,
            config,
            state: Mutex::new(State::default()),
        }
    }

    /// Apply the rule set to a snapshot. Returns the alerts fired by this
    /// call.
    pub fn evaluate(&self, report: &HealthReport) -> Vec<Alert> {
        if !self.config.enabled {
            return Vec::new();
        }
        let now = self.clock.now();
        let cooldown = chrono::Duration::seconds(
            i64::try_from(self.config.cooldown_secs).unwrap_or(i64::MAX / 1_000),
        );
        let found = findings(report);

        let mut fired = Vec::new();
        let mut resolved = Vec::new();
        {
            let mut state = self.state.lock();

            let still_firing: Vec<&str> = found.iter().map(|f| f.key.as_str()).collect();
            let cleared: Vec<String> = state
                .open
                .keys()
                .filter(|key| !still_firing.contains(&key.as_str()))
                .cloned()
                .collect();
            for key in cleared {
                if let Some(mut alert) = state.open.remove(&key) {
                    alert.resolve(now);
                    resolved.push(alert);
                }
            }

            for finding in found {
                if state.open.contains_key(&finding.key) {
                    continue;
                }
                let cooling = state
                    .last_fired
                    .get(&finding.key)
                    .is_some_and(|at| now - *at < cooldown);
                if cooling {
                    debug!(alert = %finding.key, "Alert suppressed by cooldown");
                    continue;
                }
                let alert = Alert::fire(
                    finding.key.clone(),
                    finding.rule,
                    finding.severity,
                    finding.message,
                    now,
                );
                state.last_fired.insert(finding.key.clone(), now);
                state.open.insert(finding.key, alert.clone());
                fired.push(alert);
            }
        }

        for alert in &resolved {
            info!(alert = %alert.key, "Alert cleared");
            self.notifier.notify(Event::AlertResolved(alert.clone()));
        }
        for alert in &fired {
            self.notifier.notify(Event::AlertFired(alert.clone()));
        }
        fired
    }

    /// Open alerts, most severe first.
    pub fn active(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.state.lock().open.values().cloned().collect();
        alerts.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.key.cmp(&b.key)));
        alerts
    }

    /// Mark an open alert as seen. `None` when no such alert is open.
    pub fn acknowledge(&self, key: &str) -> Option<Alert> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let alert = state.open.get_mut(key)?;
        alert.acknowledge(now);
        Some(alert.clone())
    }

    /// Close an open alert by hand. It may fire again after its cooldown.
    pub fn resolve(&self, key: &str) -> Option<Alert> {
        let now = self.clock.now();
        let mut alert = self.state.lock().open.remove(key)?;
        alert.resolve(now);
        self.notifier.notify(Event::AlertResolved(alert.clone()));
        Some(alert)
    }
}
