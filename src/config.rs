//! Configuration for the codec and data trees
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (yangtree.toml)
//! - Environment variables (YANGTREE__*)
//!
//! ## Example config file (yangtree.toml):
//! ```toml
//! [encode]
//! mode = "full"
//! output_format = "compact"
//! qualify_local_identities = true
//!
//! [decode]
//! unknown_members = "ignore"
//!
//! [tree]
//! path_index = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Encoder settings
    #[serde(default)]
    pub encode: EncodeConfig,

    /// Decoder settings
    #[serde(default)]
    pub decode: DecodeConfig,

    /// Data tree settings
    #[serde(default)]
    pub tree: TreeConfig,
}

/// Encoder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Which nodes are emitted
    #[serde(default)]
    pub mode: EncodeMode,

    /// Output format (pretty or compact)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Prefix identity values even when they belong to the leaf's own module
    #[serde(default)]
    pub qualify_local_identities: bool,
}

/// Which nodes an encoder emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodeMode {
    /// Only explicitly set leafs and the nodes leading to them
    #[default]
    Filtered,
    /// Every node, with defaults (or null) for unset leafs
    Full,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Decoder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// What to do with members the schema does not know
    #[serde(default)]
    pub unknown_members: UnknownMembers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMembers {
    /// Fail the decode
    #[default]
    Reject,
    /// Log a warning and skip the member
    Ignore,
}

/// Data tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Give decoded trees a fresh path index (enables leafref instance checks)
    #[serde(default = "default_true")]
    pub path_index: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self { path_index: true }
    }
}

impl CodecConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["yangtree.toml", ".yangtree.toml", "config/yangtree.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "yangtree", "yangtree") {
            let xdg_config = config_dir.config_dir().join("yangtree.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (YANGTREE__ENCODE__MODE=full)
        builder = builder.add_source(
            Environment::with_prefix("YANGTREE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CodecConfig::default();
        assert_eq!(config.encode.mode, EncodeMode::Filtered);
        assert_eq!(config.decode.unknown_members, UnknownMembers::Reject);
        assert!(!config.encode.qualify_local_identities);
        assert!(config.tree.path_index);
    }

    #[test]
    fn test_serialize_config() {
        let config = CodecConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[encode]"));
        assert!(toml_str.contains("mode = \"filtered\""));
        assert!(toml_str.contains("[decode]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[encode]\nmode = \"full\"\nqualify_local_identities = true\n\n[decode]\nunknown_members = \"ignore\"\n",
        )
        .unwrap();

        let config = CodecConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.encode.mode, EncodeMode::Full);
        assert!(config.encode.qualify_local_identities);
        assert_eq!(config.encode.output_format, OutputFormat::Pretty);
        assert_eq!(config.decode.unknown_members, UnknownMembers::Ignore);
        assert!(config.tree.path_index);
    }

    #[test]
    fn test_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = CodecConfig::default();
        config.encode.output_format = OutputFormat::Compact;
        config.tree.path_index = false;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = CodecConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.encode.output_format, OutputFormat::Compact);
        assert!(!loaded.tree.path_index);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(CodecConfig::load_from(Some("/nonexistent/yangtree-missing.toml")).is_err());
    }
}
