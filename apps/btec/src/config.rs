//! # Application Configuration
//!
//! Optional `btec.toml` settings. Command-line flags always win; the
//! config file only supplies defaults for the flags left unset.
//!
//! ```toml
//! database = "marking.redb"
//! author = 7
//! ```

use btec_core::BtecError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file searched for in the working directory.
pub const CONFIG_FILE: &str = "btec.toml";

/// Defaults loadable from `btec.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Default path of the grading database.
    pub database: Option<PathBuf>,
    /// Default author user id for definition edits.
    pub author: Option<u64>,
}

impl AppConfig {
    /// Parse a config file at the given path.
    pub fn load(path: &Path) -> Result<Self, BtecError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BtecError::IoError(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| BtecError::SerializationError(format!("{}: {e}", path.display())))
    }

    /// Load `btec.toml` from the working directory when present; a missing
    /// file is simply the default config, a malformed one is an error.
    pub fn discover() -> Result<Self, BtecError> {
        let path = Path::new(CONFIG_FILE);
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "database = \"marking.redb\"\nauthor = 7\n").expect("write");
        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.database, Some(PathBuf::from("marking.redb")));
        assert_eq!(config.author, Some(7));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "databse = \"typo.redb\"\n").expect("write");
        assert!(AppConfig::load(&path).is_err());
    }
}
