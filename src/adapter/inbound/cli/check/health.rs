use std::path::Path;

use serde_json::json;
use tabled::Tabled;

use crate::adapter::inbound::cli::output;
use crate::domain::{HealthReport, HealthStatus};
use crate::error::Result;
use crate::infrastructure::config::Config;

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Critical")]
    critical: bool,
    #[tabled(rename = "Detail")]
    message: String,
}

fn rows(report: &HealthReport) -> Vec<ComponentRow> {
    report
        .components()
        .iter()
        .map(|c| ComponentRow {
            name: c.name().to_string(),
            status: output::status(c.status(), status_tone(c.status())),
            critical: c.critical(),
            message: c.message().unwrap_or("").to_string(),
        })
        .collect()
}

fn status_tone(status: HealthStatus) -> Option<bool> {
    match status {
        HealthStatus::Healthy => Some(true),
        HealthStatus::Degraded => None,
        HealthStatus::Unhealthy => Some(false),
    }
}

/// Print a health snapshot.
pub fn render(report: &HealthReport) -> Result<()> {
    if output::is_json() {
        output::json_output(json!({
            "command": "check.health",
            "status": report.status(),
            "report": serde_json::to_value(report)?,
        }));
        return Ok(());
    }

    output::section("Health Check");
    output::field("Checked at", report.checked_at().to_rfc3339());
    output::table(rows(report));
    if report.is_healthy() {
        output::success("All components healthy");
    } else {
        output::warning(&format!("System is {}", report.status()));
    }
    Ok(())
}

/// Connect with the given configuration and take one health snapshot.
#[cfg(feature = "evm")]
pub async fn execute_health<P: AsRef<Path>>(config_path: P) -> Result<()> {
    use crate::infrastructure::bootstrap;

    let config = Config::load(config_path.as_ref())?;
    let services = bootstrap::connect(&config).await?;
    let report = services.health.check().await;
    render(&report)?;
    if report.status() == HealthStatus::Unhealthy {
        return Err(crate::error::Error::Connection(
            "one or more critical components are unhealthy".into(),
        ));
    }
    Ok(())
}

#[cfg(not(feature = "evm"))]
pub async fn execute_health<P: AsRef<Path>>(config_path: P) -> Result<()> {
    Config::load(config_path.as_ref())?;
    Err(crate::error::Error::Config(crate::error::ConfigError::Other(
        "health checks need the evm feature".into(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ComponentHealth;
    use crate::testkit::fixtures;

    #[test]
    fn rows_follow_components() {
        let report = HealthReport::new(
            vec![
                ComponentHealth::healthy("database", true),
                ComponentHealth::degraded("fetchers", false, "1 of 2 sources down"),
            ],
            fixtures::t0(),
        );
        let rows = rows(&report);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "fetchers");
        assert_eq!(rows[1].message, "1 of 2 sources down");
        assert!(rows[0].critical);
    }

    #[test]
    fn tones() {
        assert_eq!(status_tone(HealthStatus::Healthy), Some(true));
        assert_eq!(status_tone(HealthStatus::Degraded), None);
        assert_eq!(status_tone(HealthStatus::Unhealthy), Some(false));
    }
}
