//! CLI integration tests against a temporary configuration and database.

mod support;

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use oracled::domain::{Job, JobStatus, JobType};
use oracled::infrastructure::bootstrap::open_store;
use oracled::infrastructure::config::DatabaseConfig;
use oracled::port::{JobStore, MarketStore};
use oracled::testkit::fixtures;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use support::config::{minimal_toml, write_config};

fn oracled() -> Command {
    let mut cmd = cargo_bin_cmd!("oracled");
    cmd.env_remove("ORACLED_PRIVATE_KEY")
        .env_remove("ORACLED_TELEGRAM_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = write_config(dir.path(), &minimal_toml(&dir.path().join("oracled.db")));
        Self { dir, config }
    }

    fn with_toml(extra: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let contents = format!("{}{extra}", minimal_toml(&dir.path().join("oracled.db")));
        let config = write_config(dir.path(), &contents);
        Self { dir, config }
    }

    fn database(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.dir.path().join("oracled.db").to_string_lossy().into_owned(),
        }
    }

    fn config(&self) -> &Path {
        &self.config
    }
}

#[test]
fn help_lists_commands() {
    oracled()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("jobs"))
        .stdout(predicate::str::contains("markets"));
}

#[test]
fn version_names_the_binary() {
    oracled()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("oracled"));
}

#[test]
fn check_config_accepts_valid_file() {
    let ws = Workspace::new();
    oracled()
        .args(["--color", "never", "check", "config", "--config"])
        .arg(ws.config())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("pyth"))
        .stdout(predicate::str::contains("ORACLED_PRIVATE_KEY"));
}

#[test]
fn check_config_json_is_one_object() {
    let ws = Workspace::new();
    let output = oracled()
        .args(["--json", "check", "config", "--config"])
        .arg(ws.config())
        .output()
        .expect("run oracled");
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is a JSON object");
    assert_eq!(value["command"], "check.config");
    assert_eq!(value["valid"], true);
    assert_eq!(value["fetchers"], json!(["pyth"]));
}

#[test]
fn check_config_rejects_invalid_value() {
    let ws = Workspace::with_toml("\n[scheduler]\nworkers = 0\n");
    oracled()
        .args(["--color", "never", "check", "config", "--config"])
        .arg(ws.config())
        .assert()
        .failure()
        .stderr(predicate::str::contains("scheduler.workers"));
}

#[test]
fn check_config_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    oracled()
        .args(["check", "config", "--config"])
        .arg(dir.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn jobs_list_on_empty_database() {
    let ws = Workspace::new();
    oracled()
        .args(["--color", "never", "jobs", "list", "--config"])
        .arg(ws.config())
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs found"));
}

#[test]
fn jobs_list_rejects_unknown_status() {
    let ws = Workspace::new();
    oracled()
        .args(["jobs", "list", "--status", "stuck", "--config"])
        .arg(ws.config())
        .assert()
        .failure();
}

#[tokio::test]
async fn jobs_replay_requeues_failed_job() {
    let ws = Workspace::new();
    let store = open_store(&ws.database()).unwrap();
    let mut job = Job::new(
        JobType::ResolveMarket,
        fixtures::market_id(1),
        json!({}),
        fixtures::t0(),
        5,
        fixtures::t0(),
    );
    job.status = JobStatus::Failed;
    job.attempts = 5;
    job.last_error = Some("rpc unavailable".into());
    store.insert_job(&job).await.unwrap();

    let output = oracled()
        .args(["--json", "jobs", "list", "--status", "failed", "--config"])
        .arg(ws.config())
        .output()
        .expect("run oracled");
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed["command"], "jobs.list");
    assert_eq!(listed["jobs"].as_array().map(Vec::len), Some(1));

    oracled()
        .args(["--color", "never", "jobs", "replay", "--config"])
        .arg(ws.config())
        .arg(job.id.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("Requeued"));

    let stored = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    assert_eq!(stored.attempts, 0);

    oracled()
        .args(["jobs", "replay", "--config"])
        .arg(ws.config())
        .arg(job.id.to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("only FAILED jobs can be replayed"));
}

#[test]
fn jobs_replay_unknown_id_fails() {
    let ws = Workspace::new();
    oracled()
        .args(["jobs", "replay", "--config"])
        .arg(ws.config())
        .arg("0b5c3f7e-6f5e-4a57-9d1e-3c2a1b0f9e8d")
        .assert()
        .failure()
        .stderr(predicate::str::contains("job not found"));
}

#[test]
fn markets_show_unknown_market_fails() {
    let ws = Workspace::new();
    oracled()
        .args(["markets", "show", "--config"])
        .arg(ws.config())
        .arg(fixtures::market_id(7).to_string())
        .assert()
        .failure()
        .stderr(predicate::str::contains("market not found"));
}

#[tokio::test]
async fn markets_show_renders_stored_market() {
    let ws = Workspace::new();
    let store = open_store(&ws.database()).unwrap();
    let market = fixtures::market(1);
    store.insert_market(&market).await.unwrap();

    oracled()
        .args(["--color", "never", "markets", "show", "--config"])
        .arg(ws.config())
        .arg(market.id.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("ETH above 3000 #1"))
        .stdout(predicate::str::contains("ACTIVE"));

    let output = oracled()
        .args(["--json", "markets", "show", "--config"])
        .arg(ws.config())
        .arg(market.id.to_string())
        .output()
        .expect("run oracled");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["command"], "markets.show");
    assert!(value["resolution"].is_null());
}
