//! SQLite location.

use serde::Deserialize;

/// `[database]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// File path, or `:memory:`.
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "oracled.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}
