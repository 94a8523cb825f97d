mod support;

use std::fs;

use oracled::domain::SubjectKind;
use oracled::error::{ConfigError, Error};
use oracled::infrastructure::config::Config;
use rust_decimal_macros::dec;

use support::architecture::read_relative;
use support::config::{minimal_toml, write_config};

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn example_config_is_valid() {
    let config =
        Config::parse_toml_with_env(&read_relative("config.example.toml"), no_env).unwrap();

    assert_eq!(config.database.url, "oracled.db");
    assert_eq!(config.chain.chain_id, 1);
    assert_eq!(config.gas.gas_limit_multiplier, dec!(1.2));
    assert_eq!(config.scheduler.workers, 4);
    assert!(config.alerts.rules.enabled);
    assert!(!config.alerts.telegram.enabled);

    let ids: Vec<&str> = config.fetchers.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["pyth", "hl"]);
    assert_eq!(config.fetchers[0].kinds, vec![SubjectKind::TokenPrice]);
    assert_eq!(config.fetchers[1].resilience.min_interval_ms, 200);
}

#[test]
fn config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &minimal_toml(&dir.path().join("oracled.db")));

    let config = Config::load(&path).unwrap();
    assert_eq!(config.fetchers.len(), 1);
    assert!(config.database.url.ends_with("oracled.db"));
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("absent.toml"));

    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::ReadFile(_)))
    ));
}

#[test]
fn invalid_value_names_its_field() {
    let dir = tempfile::tempdir().unwrap();
    let contents = format!(
        "{}\n[scheduler]\nworkers = 0\n",
        minimal_toml(&dir.path().join("oracled.db"))
    );
    let path = write_config(dir.path(), &contents);
    let result = Config::load(&path);
    let _ = fs::remove_file(&path);

    match result {
        Err(Error::Config(ConfigError::InvalidValue {
            field: "scheduler.workers",
            ..
        })) => {}
        Err(err) => panic!("Expected invalid workers error, got {err}"),
        Ok(config) => panic!(
            "Expected zero workers to be rejected, got {}",
            config.scheduler.workers
        ),
    }
}

#[test]
fn unknown_subject_kind_is_a_parse_error() {
    let content = format!(
        "{}kinds = [\"WEATHER\"]\n",
        minimal_toml(std::path::Path::new("oracled.db"))
    );
    let result = Config::parse_toml_with_env(&content, no_env);

    assert!(matches!(result, Err(Error::Config(ConfigError::Parse(_)))));
}

#[test]
fn api_key_is_resolved_from_named_variable() {
    let content = format!(
        "{}api_key_env = \"PYTH_KEY\"\n",
        minimal_toml(std::path::Path::new("oracled.db"))
    );
    let config = Config::parse_toml_with_env(&content, |name| {
        (name == "PYTH_KEY").then(|| "secret".to_string())
    })
    .unwrap();

    assert_eq!(config.fetchers[0].api_key.as_deref(), Some("secret"));
}
