//! Server configuration.
//!
//! [`ServerConfig`] holds every runtime setting.  It can be built from
//! defaults, from a TOML file, or field by field from the command line; the
//! binary layers those sources (CLI values override file values).
//!
//! # File format
//!
//! Every key is optional; missing keys take the default value.
//!
//! ```toml
//! bind_address = "127.0.0.1"
//! port = 9001
//! max_payload = 1048576          # bytes
//! handshake_timeout_secs = 5
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All runtime configuration for the WebSocket server.
///
/// # Example
///
/// ```rust
/// use wsock_server::ServerConfig;
///
/// let cfg = ServerConfig::with_port(9001);
/// assert_eq!(cfg.socket_addr().port(), 9001);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.  `0.0.0.0` accepts connections on every
    /// interface; `127.0.0.1` only local ones.
    pub bind_address: IpAddr,

    /// TCP port to listen on.  `0` lets the OS pick a free port.
    pub port: u16,

    /// Largest payload a single incoming frame may declare.  Larger frames
    /// close the connection with status 1009.
    pub max_payload: u64,

    /// Seconds a new connection has to complete the HTTP upgrade.
    pub handshake_timeout_secs: u64,
}

impl ServerConfig {
    /// Default configuration listening on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid TOML or a value has the
    /// wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the TOML file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if its content is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ServerConfig {
    /// | Field                  | Default    |
    /// |------------------------|------------|
    /// | bind_address           | `0.0.0.0`  |
    /// | port                   | `8080`     |
    /// | max_payload            | 16 MiB     |
    /// | handshake_timeout_secs | 10         |
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            max_payload: wsock_core::protocol::parser::DEFAULT_MAX_PAYLOAD,
            handshake_timeout_secs: 10,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_8080() {
        // Arrange / Act
        let cfg = ServerConfig::default();
        // Assert
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_payload, 16 * 1024 * 1024);
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_with_port_keeps_other_defaults() {
        let cfg = ServerConfig::with_port(9001);
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.bind_address, ServerConfig::default().bind_address);
    }

    #[test]
    fn test_full_toml_document() {
        // Arrange
        let text = r#"
            bind_address = "127.0.0.1"
            port = 9001
            max_payload = 1024
            handshake_timeout_secs = 3
        "#;

        // Act
        let cfg = ServerConfig::from_toml_str(text).unwrap();

        // Assert
        assert_eq!(cfg.socket_addr().to_string(), "127.0.0.1:9001");
        assert_eq!(cfg.max_payload, 1024);
        assert_eq!(cfg.handshake_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let cfg = ServerConfig::from_toml_str("port = 7000").unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.handshake_timeout_secs, 10);
        assert_eq!(cfg.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(ServerConfig::from_toml_str("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let result = ServerConfig::from_toml_str("port = \"eighty\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_bind_address_is_parse_error() {
        let result = ServerConfig::from_toml_str("bind_address = \"not.an.ip\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = ServerConfig::load(Path::new("/nonexistent/wsock/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_serializes_and_deserializes_round_trip() {
        let cfg = ServerConfig {
            port: 1234,
            max_payload: 99,
            ..ServerConfig::default()
        };
        let text = toml::to_string(&cfg).expect("serialize");
        assert_eq!(ServerConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
