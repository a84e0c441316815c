//! Assay Configuration
//!
//! Engine settings for one project.
//! Config file: `<project>/.assay/config.toml` (optional, defaults otherwise)

use crate::knowledge::DEFAULT_CONTEXT_ID;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_context_id() -> String {
    DEFAULT_CONTEXT_ID.to_string()
}

fn default_validity_days() -> i64 {
    90
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_waiver_warning_days() -> i64 {
    30
}

/// Main Assay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssayConfig {
    /// Bounded context for phase derivation and new holons
    #[serde(default = "default_context_id")]
    pub context_id: String,

    /// Default validity horizon for newly recorded evidence
    #[serde(default = "default_validity_days")]
    pub evidence_validity_days: i64,

    /// Fallback log filter when ASSAY_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Freshness report warns about waivers expiring within this window
    #[serde(default = "default_waiver_warning_days")]
    pub waiver_warning_days: i64,
}

impl Default for AssayConfig {
    fn default() -> Self {
        Self {
            context_id: default_context_id(),
            evidence_validity_days: default_validity_days(),
            log_level: default_log_level(),
            waiver_warning_days: default_waiver_warning_days(),
        }
    }
}

impl AssayConfig {
    /// Load configuration from file, defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AssayConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AssayConfig::default();
        assert_eq!(config.context_id, "default");
        assert_eq!(config.evidence_validity_days, 90);
        assert_eq!(config.waiver_warning_days, 30);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AssayConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AssayConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "context_id = \"payments\"\n").unwrap();

        let config = AssayConfig::load(&path).unwrap();
        assert_eq!(config.context_id, "payments");
        assert_eq!(config.evidence_validity_days, 90);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub/config.toml");
        let mut config = AssayConfig::default();
        config.evidence_validity_days = 14;
        config.save(&path).unwrap();
        assert_eq!(AssayConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "context_id = [").unwrap();
        assert!(AssayConfig::load(&path).is_err());
    }
}
