use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Log configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LogConfig {
  /// Log file path, if not set, logs will be printed to stdout
  pub file: Option<PathBuf>,
  /// Log level, default is "info"
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      file: None,
      level: default_log_level(),
    }
  }
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
  /// Root directory holding one subdirectory per collection
  #[serde(default = "default_data_dir")]
  pub data_dir: PathBuf,

  /// Server listening address (RESP protocol)
  #[serde(default = "default_server_addr")]
  pub server_addr: String,

  /// Remove leftover `*.json.tmp` files when the store opens
  #[serde(default)]
  pub sweep_temp_files: bool,

  /// Log configuration
  #[serde(default)]
  pub log: LogConfig,
}

fn default_data_dir() -> PathBuf {
  PathBuf::from("./data")
}

fn default_server_addr() -> String {
  "127.0.0.1:6380".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      server_addr: default_server_addr(),
      sweep_temp_files: false,
      log: LogConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from TOML file
  pub fn from_file(path: &str) -> anyhow::Result<Self> {
    let config_str =
      fs::read_to_string(path).with_context(|| format!("Failed to read config file '{}'", path))?;

    let config: Config = toml::from_str(&config_str)
      .with_context(|| format!("Failed to parse config file '{}'", path))?;

    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> anyhow::Result<()> {
    if self.data_dir.as_os_str().is_empty() {
      bail!("data_dir must not be empty");
    }
    self
      .server_addr
      .parse::<SocketAddr>()
      .with_context(|| format!("invalid server_addr '{}'", self.server_addr))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_config() {
    let config_str = r#"
data_dir = "/var/lib/jsondb"
server_addr = "0.0.0.0:7000"
sweep_temp_files = true

[log]
level = "debug"
file = "/var/log/jsondb.log"
"#;

    let config: Config = toml::from_str(config_str).unwrap();
    assert_eq!(config.data_dir, PathBuf::from("/var/lib/jsondb"));
    assert_eq!(config.server_addr, "0.0.0.0:7000");
    assert!(config.sweep_temp_files);
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.file, Some(PathBuf::from("/var/log/jsondb.log")));
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.server_addr, "127.0.0.1:6380");
    assert_eq!(config.log.level, "info");
    assert!(config.log.file.is_none());
  }

  #[test]
  fn test_validate_rejects_bad_values() {
    let config = Config {
      server_addr: "not an address".into(),
      ..Config::default()
    };
    assert!(config.validate().is_err());

    let config = Config {
      data_dir: PathBuf::new(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("jsondb.toml");
    fs::write(&path, "data_dir = \"db\"\n").unwrap();

    let config = Config::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.data_dir, PathBuf::from("db"));

    assert!(Config::from_file("/definitely/not/here.toml").is_err());
  }
}
