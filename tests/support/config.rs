use std::fs;
use std::path::{Path, PathBuf};

pub const ORACLE_ADDRESS: &str = "0x00000000000000000000000000000000000000aa";
pub const FACTORY_ADDRESS: &str = "0xfafafafafafafafafafafafafafafafafafafafa";

/// Smallest valid configuration, storing its database at `database_url`.
pub fn minimal_toml(database_url: &Path) -> String {
    format!(
        r#"
[database]
url = "{}"

[chain]
rpc_url = "http://127.0.0.1:8545"
oracle_address = "{ORACLE_ADDRESS}"
factory_address = "{FACTORY_ADDRESS}"

[[fetchers]]
id = "pyth"
base_url = "https://prices.example.com"
"#,
        database_url.display().to_string().replace('\\', "/")
    )
}

/// Write `contents` as `oracled.toml` inside `dir`.
pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("oracled.toml");
    fs::write(&path, contents).expect("write temp config");
    path
}
