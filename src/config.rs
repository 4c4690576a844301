//! Configuration for the label index
//!
//! Supports TOML files, `TAGTREE_*` environment variable overrides and
//! sensible defaults. Every field may be omitted from a file.
//!
//! ```toml
//! registry_stripes = 32
//! max_series = 1000000
//! max_regex_pattern_len = 512
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::matcher::{DEFAULT_MAX_REGEX_PATTERN_LEN, DEFAULT_REGEX_SIZE_LIMIT};

/// Upper bound on stripe counts
const MAX_STRIPES: usize = 4096;

/// Index configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Lock stripes for label-set keys in the series registry (power of two)
    #[serde(default = "default_stripes")]
    pub registry_stripes: usize,

    /// Lock stripes for label names in the tag tree (power of two)
    #[serde(default = "default_stripes")]
    pub tag_tree_stripes: usize,

    /// Maximum number of series; 0 means unlimited
    #[serde(default = "default_max_series")]
    pub max_series: usize,

    /// Maximum labels per series
    #[serde(default = "default_max_labels_per_series")]
    pub max_labels_per_series: usize,

    /// Maximum label name length in bytes
    #[serde(default = "default_max_label_name_len")]
    pub max_label_name_len: usize,

    /// Maximum label value length in bytes
    #[serde(default = "default_max_label_value_len")]
    pub max_label_value_len: usize,

    /// Maximum regex pattern length in bytes
    #[serde(default = "default_max_regex_pattern_len")]
    pub max_regex_pattern_len: usize,

    /// Maximum compiled regex size in bytes
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,
}

fn default_stripes() -> usize { 16 }
fn default_max_series() -> usize { 10_000_000 }
fn default_max_labels_per_series() -> usize { 64 }
fn default_max_label_name_len() -> usize { 256 }
fn default_max_label_value_len() -> usize { 4096 }
fn default_max_regex_pattern_len() -> usize { DEFAULT_MAX_REGEX_PATTERN_LEN }
fn default_regex_size_limit() -> usize { DEFAULT_REGEX_SIZE_LIMIT }

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            registry_stripes: default_stripes(),
            tag_tree_stripes: default_stripes(),
            max_series: default_max_series(),
            max_labels_per_series: default_max_labels_per_series(),
            max_label_name_len: default_max_label_name_len(),
            max_label_value_len: default_max_label_value_len(),
            max_regex_pattern_len: default_max_regex_pattern_len(),
            regex_size_limit: default_regex_size_limit(),
        }
    }
}

impl IndexConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `TAGTREE_*` environment variable overrides
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        override_usize("TAGTREE_REGISTRY_STRIPES", &mut self.registry_stripes);
        override_usize("TAGTREE_TAG_TREE_STRIPES", &mut self.tag_tree_stripes);
        override_usize("TAGTREE_MAX_SERIES", &mut self.max_series);
        override_usize(
            "TAGTREE_MAX_LABELS_PER_SERIES",
            &mut self.max_labels_per_series,
        );
        override_usize("TAGTREE_MAX_LABEL_NAME_LEN", &mut self.max_label_name_len);
        override_usize("TAGTREE_MAX_LABEL_VALUE_LEN", &mut self.max_label_value_len);
        override_usize(
            "TAGTREE_MAX_REGEX_PATTERN_LEN",
            &mut self.max_regex_pattern_len,
        );
        override_usize("TAGTREE_REGEX_SIZE_LIMIT", &mut self.regex_size_limit);
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, stripes) in [
            ("registry_stripes", self.registry_stripes),
            ("tag_tree_stripes", self.tag_tree_stripes),
        ] {
            if stripes == 0 || !stripes.is_power_of_two() {
                return Err(Error::Configuration(format!(
                    "{} must be a power of two, got {}",
                    name, stripes
                )));
            }
            if stripes > MAX_STRIPES {
                return Err(Error::Configuration(format!(
                    "{} cannot exceed {}, got {}",
                    name, MAX_STRIPES, stripes
                )));
            }
        }

        if self.max_labels_per_series == 0 {
            return Err(Error::Configuration(
                "max_labels_per_series must be > 0".to_string(),
            ));
        }
        if self.max_label_name_len == 0 {
            return Err(Error::Configuration(
                "max_label_name_len must be > 0".to_string(),
            ));
        }
        if self.max_regex_pattern_len == 0 || self.regex_size_limit == 0 {
            return Err(Error::Configuration(
                "regex limits must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}

fn override_usize(var: &str, target: &mut usize) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(value) => *target = value,
            Err(e) => tracing::warn!(var, value = %raw, error = %e, "Ignoring invalid override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.registry_stripes, 16);
        assert_eq!(config.tag_tree_stripes, 16);
        assert_eq!(config.max_series, 10_000_000);
        assert_eq!(config.max_labels_per_series, 64);
        assert_eq!(config.regex_size_limit, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stripes_must_be_power_of_two() {
        let config = IndexConfig {
            registry_stripes: 12,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = IndexConfig {
            tag_tree_stripes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = IndexConfig {
            tag_tree_stripes: 8192,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = IndexConfig {
            max_labels_per_series: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = IndexConfig {
            regex_size_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Unlimited series is allowed
        let config = IndexConfig {
            max_series: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: IndexConfig = toml::from_str("max_series = 42\n").unwrap();
        assert_eq!(config.max_series, 42);
        assert_eq!(config.registry_stripes, 16);
        assert_eq!(config.max_label_value_len, 4096);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagtree.toml");

        let config = IndexConfig {
            registry_stripes: 64,
            max_series: 500,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = IndexConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = IndexConfig::from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Configuration(_))));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "max_series = \"many\"").unwrap();
        assert!(matches!(
            IndexConfig::from_file(&bad),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("TAGTREE_MAX_LABEL_NAME_LEN", "99");
        std::env::set_var("TAGTREE_TAG_TREE_STRIPES", "not-a-number");
        let config = IndexConfig::from_env();
        std::env::remove_var("TAGTREE_MAX_LABEL_NAME_LEN");
        std::env::remove_var("TAGTREE_TAG_TREE_STRIPES");

        assert_eq!(config.max_label_name_len, 99);
        assert_eq!(config.tag_tree_stripes, 16);
    }
}
