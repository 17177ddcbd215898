//! Tool settings for the continuum binary.
//!
//! Settings are loaded from an optional TOML file (default: `continuum.toml`).
//! Every field has a default, so an empty file and no file are equivalent.

use crate::discover::BridgeCandidates;
use continuum_core::{AddressPlan, ScheduleError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default settings file name.
pub const SETTINGS_FILE: &str = "continuum.toml";

/// Root settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Directory the artifacts are written to (default: `.tmp`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// VM image directory on the physical machines (default: `/var/lib/libvirt/images`).
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// SSH public key authorized in every VM (default: `~/.ssh/id_rsa_benchmark.pub`).
    #[serde(default = "default_ssh_public_key")]
    pub ssh_public_key: PathBuf,
    /// Addressing and bridge settings.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkConfig {
    /// First three octets of every VM address (default: `192.168.122`).
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    /// Host octet of the first VM (default: 10).
    #[serde(default = "default_first_host")]
    pub first_host: u8,
    /// Offset from `first_host` where base images start (default: 200).
    #[serde(default = "default_base_offset")]
    pub base_offset: u8,
    /// Preferred bridge (default: `br0`).
    #[serde(default = "default_primary_bridge")]
    pub primary_bridge: String,
    /// Bridge used when the preferred one is absent (default: `virbr0`).
    #[serde(default = "default_fallback_bridge")]
    pub fallback_bridge: String,
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from(".tmp")
}

fn default_image_dir() -> String {
    "/var/lib/libvirt/images".to_string()
}

fn default_ssh_public_key() -> PathBuf {
    let key = Path::new(".ssh").join("id_rsa_benchmark.pub");
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(key),
        None => key,
    }
}

fn default_address_prefix() -> String {
    "192.168.122".to_string()
}

fn default_first_host() -> u8 {
    10
}

fn default_base_offset() -> u8 {
    200
}

fn default_primary_bridge() -> String {
    "br0".to_string()
}

fn default_fallback_bridge() -> String {
    "virbr0".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address_prefix: default_address_prefix(),
            first_host: default_first_host(),
            base_offset: default_base_offset(),
            primary_bridge: default_primary_bridge(),
            fallback_bridge: default_fallback_bridge(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            image_dir: default_image_dir(),
            ssh_public_key: default_ssh_public_key(),
            network: NetworkConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| SettingsError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path` if given, else `continuum.toml` in the working directory
    /// if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(SETTINGS_FILE).is_file() => Self::from_file(Path::new(SETTINGS_FILE)),
            None => Ok(Self::default()),
        }
    }

    /// Address plan for VM addressing.
    pub fn address_plan(&self) -> Result<AddressPlan, ScheduleError> {
        AddressPlan::new(
            &self.network.address_prefix,
            self.network.first_host,
            self.network.base_offset,
        )
    }

    /// Bridges to look for.
    pub fn bridges(&self) -> BridgeCandidates {
        BridgeCandidates {
            primary: self.network.primary_bridge.clone(),
            fallback: self.network.fallback_bridge.clone(),
        }
    }

    /// Read the SSH public key, trimmed.
    pub async fn read_ssh_key(&self) -> Result<String, SettingsError> {
        let key = tokio::fs::read_to_string(&self.ssh_public_key)
            .await
            .map_err(|e| SettingsError::ReadError {
                path: self.ssh_public_key.clone(),
                source: e,
            })?;
        Ok(key.trim().to_string())
    }
}

/// Settings error types.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Failed to read a settings or key file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the settings file.
    #[error("failed to parse settings file {path}: {source}")]
    ParseError {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.output_dir, PathBuf::from(".tmp"));
        assert_eq!(settings.image_dir, "/var/lib/libvirt/images");
        assert!(settings.ssh_public_key.ends_with(".ssh/id_rsa_benchmark.pub"));
        assert_eq!(settings.address_plan().unwrap(), AddressPlan::default());
        assert_eq!(settings.bridges(), BridgeCandidates::default());
    }

    #[test]
    fn settings_from_toml_string() {
        let toml = r#"
output_dir = "/tmp/continuum"
ssh_public_key = "/keys/bench.pub"

[network]
address_prefix = "10.10.0"
first_host = 20
fallback_bridge = "virbr1"
"#;
        let settings: Settings = toml::from_str(toml).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/continuum"));
        assert_eq!(settings.ssh_public_key, PathBuf::from("/keys/bench.pub"));
        assert_eq!(settings.image_dir, "/var/lib/libvirt/images");
        assert_eq!(settings.network.first_host, 20);
        assert_eq!(settings.network.base_offset, 200);
        assert_eq!(settings.network.primary_bridge, "br0");
        assert_eq!(settings.network.fallback_bridge, "virbr1");
        assert_eq!(
            settings.address_plan().unwrap(),
            AddressPlan::new("10.10.0", 20, 200).unwrap()
        );
    }

    #[test]
    fn empty_file_uses_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn from_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first_host = \"not a table\"\n[network").unwrap();
        match Settings::from_file(file.path()) {
            Err(SettingsError::ParseError { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {other:?}"),
        }

        let missing = Path::new("/nonexistent/continuum.toml");
        assert!(matches!(
            Settings::load(Some(missing)),
            Err(SettingsError::ReadError { .. })
        ));
    }

    #[tokio::test]
    async fn ssh_key_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ssh-rsa AAAA jdoe@host").unwrap();
        let settings = Settings {
            ssh_public_key: file.path().to_path_buf(),
            ..Settings::default()
        };
        assert_eq!(settings.read_ssh_key().await.unwrap(), "ssh-rsa AAAA jdoe@host");
    }
}
