//! Cobble Configuration Management
//!
//! Loads `serveroptions.txt`, a flat `key = value` file:
//!
//! ```text
//! # Network
//! serverip = 0.0.0.0
//! serverport = 25565
//! maxconnections = 1000
//!
//! # Login
//! onlinemode = true
//! compressionthreshold = 256   # "off" disables compression
//! ```
//!
//! Lines starting with `#` and blank lines are skipped. A trailing comment
//! needs whitespace on both sides of its `#`, so `motd = Join #1` keeps the
//! `#1`. Unknown keys are
//! ignored and malformed values keep their defaults.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use cobble_network::ServerConfig;

/// Default location of the options file
pub const DEFAULT_OPTIONS_PATH: &str = "config/serveroptions.txt";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server options as written in `serveroptions.txt`
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    // Network
    /// Interface to bind (from "serverip" option)
    pub server_ip: IpAddr,
    /// Listen port (from "serverport" option)
    pub server_port: u16,
    /// Connection limit (from "maxconnections" option)
    pub max_connections: usize,
    /// Listen backlog (from "backlog" option)
    pub backlog: u32,
    /// Idle read timeout in seconds (from "readtimeout" option)
    pub read_timeout_secs: u64,
    /// Worker threads, 0 = one per core (from "workerthreads" option)
    pub worker_threads: usize,

    // Login
    /// Key exchange and encryption (from "onlinemode" option)
    pub online_mode: bool,
    /// Compression threshold, `None` = off (from "compressionthreshold" option)
    pub compression_threshold: Option<usize>,
    /// zlib level (from "compressionlevel" option)
    pub compression_level: u32,

    // Server list
    /// Message of the day (from "motd" option)
    pub motd: String,
    /// Advertised player limit (from "maxplayers" option)
    pub max_players: usize,
    /// Advertised version name (from "versionname" option)
    pub version_name: String,
    /// Advertised protocol version (from "protocolversion" option)
    pub protocol_version: i32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let network = ServerConfig::default();
        Self {
            server_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: network.bind_address.port(),
            max_connections: network.max_connections,
            backlog: network.backlog,
            read_timeout_secs: network.read_timeout.as_secs(),
            worker_threads: network.worker_threads,
            online_mode: network.online_mode,
            compression_threshold: network.compression_threshold,
            compression_level: network.compression_level,
            motd: network.motd,
            max_players: network.max_players,
            version_name: network.version_name,
            protocol_version: network.protocol_version,
        }
    }
}

/// Parse `value`, keeping `current` (and logging) when it is malformed
fn parse_or<T: FromStr>(key: &str, value: &str, current: T) -> T {
    value.parse().unwrap_or_else(|_| {
        tracing::warn!("Ignoring malformed value for {}: {:?}", key, value);
        current
    })
}

fn parse_bool(key: &str, value: &str, current: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => true,
        "false" | "no" | "off" | "0" => false,
        _ => {
            tracing::warn!("Ignoring malformed value for {}: {:?}", key, value);
            current
        }
    }
}

/// Cut a `#` comment that starts the line or stands alone between whitespace
fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }

    let mut prev = None;
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, next)| next);
        if c == '#'
            && prev.is_some_and(char::is_whitespace)
            && next.map_or(true, char::is_whitespace)
        {
            return &line[..i];
        }
        prev = Some(c);
    }
    line
}

impl ServerOptions {
    /// Load options from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Load options from a file, falling back to defaults if it does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("{} not found, using default options", path.display());
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// Parse `serveroptions.txt` content
    pub fn parse(content: &str) -> Self {
        let mut options = Self::default();

        for line in content.lines() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            match line.split_once('=') {
                Some((key, value)) => options.parse_option(key.trim(), value.trim()),
                None => tracing::debug!("Skipping config line without '=': {}", line),
            }
        }

        options
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key.to_ascii_lowercase().as_str() {
            "serverip" => self.server_ip = parse_or(key, value, self.server_ip),
            "serverport" => self.server_port = parse_or(key, value, self.server_port),
            "maxconnections" => self.max_connections = parse_or(key, value, self.max_connections),
            "backlog" => self.backlog = parse_or(key, value, self.backlog),
            "readtimeout" => self.read_timeout_secs = parse_or(key, value, self.read_timeout_secs),
            "workerthreads" => self.worker_threads = parse_or(key, value, self.worker_threads),
            "onlinemode" => self.online_mode = parse_bool(key, value, self.online_mode),
            "compressionthreshold" => {
                self.compression_threshold = match value.to_ascii_lowercase().as_str() {
                    "off" | "none" | "-1" => None,
                    _ => match value.parse() {
                        Ok(threshold) => Some(threshold),
                        Err(_) => {
                            tracing::warn!("Ignoring malformed value for {}: {:?}", key, value);
                            self.compression_threshold
                        }
                    },
                };
            }
            "compressionlevel" => {
                self.compression_level = parse_or(key, value, self.compression_level)
            }
            "motd" => self.motd = value.to_string(),
            "maxplayers" => self.max_players = parse_or(key, value, self.max_players),
            "versionname" => self.version_name = value.to_string(),
            "protocolversion" => {
                self.protocol_version = parse_or(key, value, self.protocol_version)
            }
            _ => tracing::debug!("Unknown config option: {} = {}", key, value),
        }
    }

    /// Get the bind address for the TCP listener
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }

    /// Convert into the networking layer's configuration
    ///
    /// # Errors
    /// `Invalid` if the resulting configuration fails validation.
    pub fn into_network_config(self) -> Result<ServerConfig, ConfigError> {
        let config = ServerConfig {
            bind_address: self.bind_address(),
            max_connections: self.max_connections,
            backlog: self.backlog,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            worker_threads: self.worker_threads,
            compression_threshold: self.compression_threshold,
            compression_level: self.compression_level,
            online_mode: self.online_mode,
            motd: self.motd,
            max_players: self.max_players,
            version_name: self.version_name,
            protocol_version: self.protocol_version,
        };
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Server options:");
        tracing::info!("  Bind: {}", self.bind_address());
        tracing::info!(
            "  Connections: max {}, backlog {}, idle timeout {}s",
            self.max_connections,
            self.backlog,
            self.read_timeout_secs
        );
        tracing::info!(
            "  Workers: {}",
            if self.worker_threads == 0 {
                "auto".to_string()
            } else {
                self.worker_threads.to_string()
            }
        );
        tracing::info!("  Online mode: {}", self.online_mode);
        match self.compression_threshold {
            Some(threshold) => tracing::info!(
                "  Compression: threshold {} bytes, level {}",
                threshold,
                self.compression_level
            ),
            None => tracing::info!("  Compression: off"),
        }
        tracing::info!(
            "  Server list: \"{}\" ({} {}), {} players",
            self.motd,
            self.version_name,
            self.protocol_version,
            self.max_players
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_options() {
        let options = ServerOptions::default();
        assert_eq!(options.server_port, 25565);
        assert_eq!(options.max_connections, 1000);
        assert_eq!(options.compression_threshold, Some(256));
        assert!(options.online_mode);
    }

    #[test]
    fn test_parse_simple_options() {
        let text = r#"
# Network
serverip = 127.0.0.1
serverport = 9999
maxconnections = 50   # small test server

OnlineMode = off
compressionthreshold = 512
motd = Hello = world
"#;
        let options = ServerOptions::parse(text);
        assert_eq!(options.bind_address(), "127.0.0.1:9999".parse().unwrap());
        assert_eq!(options.max_connections, 50);
        assert!(!options.online_mode);
        assert_eq!(options.compression_threshold, Some(512));
        assert_eq!(options.motd, "Hello = world");
    }

    #[test]
    fn test_hash_inside_value_is_kept() {
        let text = "\
motd = Join #1 server
versionname = 1.21#beta # build tag
  # indented comment
maxplayers = 5 #";
        let options = ServerOptions::parse(text);
        assert_eq!(options.motd, "Join #1 server");
        assert_eq!(options.version_name, "1.21#beta");
        assert_eq!(options.max_players, 5);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let text =
            "serverport = banana\nmaxplayers = -3\nonlinemode = maybe\nnonsense\nunknown = 1";
        let options = ServerOptions::parse(text);
        assert_eq!(options, ServerOptions::default());
    }

    #[test]
    fn test_compression_off() {
        for value in ["off", "none", "-1", "OFF"] {
            let options = ServerOptions::parse(&format!("compressionthreshold = {}", value));
            assert_eq!(options.compression_threshold, None);
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "serverport = 25570").unwrap();
        writeln!(file, "readtimeout = 10").unwrap();
        writeln!(file, "workerthreads = 4").unwrap();

        let options = ServerOptions::load_from_file(file.path()).unwrap();
        assert_eq!(options.server_port, 25570);

        let config = options.into_network_config().unwrap();
        assert_eq!(config.bind_address.port(), 25570);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.worker_threads, 4);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("serveroptions.txt");

        assert!(matches!(
            ServerOptions::load_from_file(&missing),
            Err(ConfigError::Io { .. })
        ));
        assert_eq!(
            ServerOptions::load_or_default(&missing).unwrap(),
            ServerOptions::default()
        );
    }

    #[test]
    fn test_invalid_options_rejected_on_conversion() {
        let options = ServerOptions::parse("maxconnections = 0");
        assert!(matches!(
            options.into_network_config(),
            Err(ConfigError::Invalid(_))
        ));
    }
}
