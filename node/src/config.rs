//! Node configuration: YAML file with environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// UDP address the transport binds to
    pub listen_addr: SocketAddr,
    /// Root directory for the key-value store and blob store
    pub data_dir: PathBuf,
    /// Storage backend: `file` or `memory`
    pub storage: String,
    /// Connection budget for reconnection sweeps
    pub max_connections: usize,
    /// Peers dialed at startup
    pub bootstrap: Vec<SocketAddr>,
    /// Default log level when RUST_LOG is unset
    pub log_level: String,
    /// STUN server for the external-address probe; empty disables it
    pub stun_server: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4242".parse().expect("static address"),
            data_dir: PathBuf::from("./data"),
            storage: "file".to_string(),
            max_connections: 20,
            bootstrap: Vec::new(),
            log_level: "info".to_string(),
            stun_server: "stun.l.google.com:19302".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration: defaults, then the YAML file if present, then
    /// environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            config = serde_yaml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            info!("loaded configuration from {}", path.display());
        } else if let Ok(content) = std::fs::read_to_string("gossamer.yaml") {
            match serde_yaml::from_str(&content) {
                Ok(parsed) => {
                    config = parsed;
                    info!("loaded configuration from gossamer.yaml");
                }
                Err(err) => warn!("ignoring malformed gossamer.yaml: {err}"),
            }
        }

        config.apply_environment_overrides();
        Ok(config)
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(addr) = std::env::var("GOSSAMER_LISTEN_ADDR") {
            match addr.parse() {
                Ok(addr) => {
                    self.listen_addr = addr;
                    info!("listen address overridden by environment: {addr}");
                }
                Err(_) => warn!("ignoring invalid GOSSAMER_LISTEN_ADDR: {addr}"),
            }
        }

        if let Ok(dir) = std::env::var("GOSSAMER_DATA_DIR") {
            self.data_dir = PathBuf::from(&dir);
            info!("data dir overridden by environment: {dir}");
        }

        if let Ok(max) = std::env::var("GOSSAMER_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(max) => self.max_connections = max,
                Err(_) => warn!("ignoring invalid GOSSAMER_MAX_CONNECTIONS: {max}"),
            }
        }

        if let Ok(storage) = std::env::var("GOSSAMER_STORAGE") {
            self.storage = storage;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_addr.port(), 4242);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.storage, "file");
    }

    #[test]
    fn test_load_from_file() {
        let yaml = r#"
listen_addr: "127.0.0.1:5555"
data_dir: "/tmp/gossamer-test"
storage: memory
max_connections: 7
bootstrap:
  - "10.0.0.1:4242"
  - "10.0.0.2:4242"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.listen_addr.port(), 5555);
        assert_eq!(config.storage, "memory");
        assert_eq!(config.max_connections, 7);
        assert_eq!(config.bootstrap.len(), 2);
        // Unspecified fields keep their defaults.
        assert_eq!(config.log_level, "info");
    }
}
