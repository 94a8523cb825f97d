//! Default file locations.
//!
//! Everything lives under `~/.oracled/`:
//! - `~/.oracled/config.toml` - main configuration

use std::path::PathBuf;

/// Returns the oracled home directory (`~/.oracled/`).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".oracled")
}

/// Returns the default config file path (`~/.oracled/config.toml`).
pub fn default_config() -> PathBuf {
    home_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_under_oracled_home() {
        assert!(home_dir().ends_with(".oracled"));
        assert!(default_config().starts_with(home_dir()));
    }
}
