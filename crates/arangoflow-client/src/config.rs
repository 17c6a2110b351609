//! Immutable connection configuration.
//!
//! [`ClientConfig`] is built once from a flat [`ConnectionOptions`] map when
//! the service is enabled and is read-only afterwards; it is safe to share
//! across concurrent pipeline invocations. Every optional setting is applied
//! to the transport only when explicitly present in the option map, so unset
//! options never override the driver's own defaults.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

// ── Option map ──────────────────────────────────────────────────────

/// Flat string-keyed option map, the raw configuration surface handed to the
/// client by the host.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    properties: HashMap<String, String>,
}

impl ConnectionOptions {
    /// Creates an empty option map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an option map from existing properties.
    #[must_use]
    pub fn with_properties(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    /// Sets an option, returning `self` for chaining.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Gets a raw option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets an option parsed into `T`, or `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the value is present but
    /// cannot be parsed.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> ClientResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                ClientError::Configuration(format!("invalid value '{raw}' for option '{key}'"))
            }),
        }
    }

    /// Gets a required option value.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the key is absent or empty.
    pub fn require(&self, key: &str) -> ClientResult<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ClientError::Configuration(format!(
                "missing required option '{key}'"
            ))),
        }
    }
}

// ── Value types ─────────────────────────────────────────────────────

/// A single coordinator address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Policy for selecting which cluster coordinator handles each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancing {
    /// Always use the first configured coordinator.
    #[default]
    None,
    /// Rotate through coordinators request by request.
    RoundRobin,
    /// Pick a random coordinator per request.
    Random,
}

impl FromStr for LoadBalancing {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            other => Err(ClientError::Configuration(format!(
                "unknown load balancing mode '{other}': expected 'none', 'round_robin', or 'random'"
            ))),
        }
    }
}

/// Wire protocol selection for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    /// HTTP with JSON bodies.
    HttpJson,
    /// HTTP with VelocyPack bodies.
    HttpVelocyPack,
    /// The VelocyStream binary protocol.
    VelocyStream,
}

impl FromStr for WireProtocol {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http_json" => Ok(Self::HttpJson),
            "http_vpack" => Ok(Self::HttpVelocyPack),
            "vst" => Ok(Self::VelocyStream),
            other => Err(ClientError::Configuration(format!(
                "unknown protocol '{other}': expected 'http_json', 'http_vpack', or 'vst'"
            ))),
        }
    }
}

/// Database credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never leak the password through Debug output.
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// TLS settings for the transport.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Whether to connect over TLS.
    pub enabled: bool,
    /// Optional PEM-encoded CA certificate to trust in addition to the
    /// system roots.
    pub ca_certificate_pem: Option<String>,
    /// Accept invalid certificates. Test environments only.
    pub accept_invalid_certs: bool,
}

// ── ClientConfig ────────────────────────────────────────────────────

/// Immutable connection configuration for an ArangoDB cluster.
///
/// Constructed once via [`ClientConfig::from_options`] when the owning
/// service is enabled; shared read-only across invocations afterwards.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Ordered coordinator endpoints.
    pub endpoints: Vec<Endpoint>,
    /// Coordinator selection policy.
    pub load_balancing: LoadBalancing,
    /// Whether to discover the full cluster topology from the seed hosts.
    pub acquire_host_list: bool,
    /// Credentials, present iff authentication is enabled.
    pub auth: Option<Credentials>,
    /// Wire protocol. `None` leaves the driver default in place.
    pub protocol: Option<WireProtocol>,
    /// Connection and request timeout.
    pub timeout: Option<Duration>,
    /// Maximum lifetime of a pooled connection.
    pub connection_ttl: Option<Duration>,
    /// Cursor batch size (number of documents fetched per round trip).
    pub chunk_size: Option<u32>,
    /// Maximum pooled connections per host.
    pub max_connections: Option<usize>,
    /// TLS settings. `None` means plain TCP.
    pub tls: Option<TlsConfig>,
}

impl ClientConfig {
    /// Builds a configuration from a flat option map.
    ///
    /// Recognized keys:
    ///
    /// | key | meaning |
    /// |-----|---------|
    /// | `arango.hosts` | required, `host:port[,host:port...]` |
    /// | `arango.load.balancing` | `none` / `round_robin` / `random` |
    /// | `arango.acquire.host.list` | discover full topology (default `true`) |
    /// | `arango.auth.enabled` | default `true` |
    /// | `arango.auth.username` / `arango.auth.password` | required when auth is enabled |
    /// | `arango.protocol` | `http_json` / `http_vpack` / `vst` |
    /// | `arango.timeout.ms` | connection and request timeout |
    /// | `arango.connection.ttl.ms` | pooled connection lifetime |
    /// | `arango.chunk.size` | cursor batch size |
    /// | `arango.max.connections` | pool size per host |
    /// | `arango.tls.enabled` / `arango.tls.ca.pem` / `arango.tls.accept.invalid` | TLS |
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the host list is malformed,
    /// authentication is enabled without non-empty credentials, or any value
    /// fails to parse.
    pub fn from_options(options: &ConnectionOptions) -> ClientResult<Self> {
        let endpoints = parse_host_list(options.require("arango.hosts")?)?;

        let load_balancing = options
            .get_parsed::<LoadBalancing>("arango.load.balancing")?
            .unwrap_or_default();

        let acquire_host_list: bool = options
            .get_parsed("arango.acquire.host.list")?
            .unwrap_or(true);

        let auth_enabled: bool = options.get_parsed("arango.auth.enabled")?.unwrap_or(true);
        let auth = if auth_enabled {
            let username = options.require("arango.auth.username").map_err(|_| {
                ClientError::Configuration(
                    "authentication is enabled but 'arango.auth.username' is empty".into(),
                )
            })?;
            let password = options.require("arango.auth.password").map_err(|_| {
                ClientError::Configuration(
                    "authentication is enabled but 'arango.auth.password' is empty".into(),
                )
            })?;
            Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        } else {
            None
        };

        let protocol = options.get_parsed::<WireProtocol>("arango.protocol")?;

        let timeout = options
            .get_parsed::<u64>("arango.timeout.ms")?
            .map(Duration::from_millis);
        let connection_ttl = options
            .get_parsed::<u64>("arango.connection.ttl.ms")?
            .map(Duration::from_millis);
        let chunk_size = options.get_parsed::<u32>("arango.chunk.size")?;
        let max_connections = options.get_parsed::<usize>("arango.max.connections")?;

        let tls = Self::parse_tls(options)?;

        Ok(Self {
            endpoints,
            load_balancing,
            acquire_host_list,
            auth,
            protocol,
            timeout,
            connection_ttl,
            chunk_size,
            max_connections,
            tls,
        })
    }

    /// Parses the `arango.tls.*` options into an optional [`TlsConfig`].
    fn parse_tls(options: &ConnectionOptions) -> ClientResult<Option<TlsConfig>> {
        let enabled: Option<bool> = options.get_parsed("arango.tls.enabled")?;
        let ca_certificate_pem = options.get("arango.tls.ca.pem").map(ToString::to_string);
        let accept_invalid: Option<bool> = options.get_parsed("arango.tls.accept.invalid")?;

        if enabled.is_none() && ca_certificate_pem.is_none() && accept_invalid.is_none() {
            return Ok(None);
        }

        Ok(Some(TlsConfig {
            enabled: enabled.unwrap_or(true),
            ca_certificate_pem,
            accept_invalid_certs: accept_invalid.unwrap_or(false),
        }))
    }

    /// Returns `true` if authentication is enabled.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.auth.is_some()
    }
}

/// Parses a comma-separated `host:port` list.
///
/// Whitespace after commas is tolerated. Every entry must split into exactly
/// two non-empty parts; a single malformed entry rejects the whole list.
///
/// # Errors
///
/// Returns [`ClientError::Configuration`] on any malformed entry.
pub fn parse_host_list(raw: &str) -> ClientResult<Vec<Endpoint>> {
    if raw.trim().is_empty() {
        return Err(ClientError::Configuration("empty host list".into()));
    }

    let mut endpoints = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim_start();
        let mut parts = entry.split(':');
        let (host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) if !host.is_empty() && !port.is_empty() => (host, port),
            _ => {
                return Err(ClientError::Configuration(format!(
                    "malformed host entry '{entry}': expected 'host:port'"
                )));
            }
        };
        let port: u16 = port.parse().map_err(|_| {
            ClientError::Configuration(format!("invalid port '{port}' in host entry '{entry}'"))
        })?;
        endpoints.push(Endpoint {
            host: host.to_string(),
            port,
        });
    }

    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_options() -> ConnectionOptions {
        ConnectionOptions::new()
            .with_option("arango.hosts", "db1:8529")
            .with_option("arango.auth.enabled", "false")
    }

    #[test]
    fn test_parse_single_host() {
        let endpoints = parse_host_list("localhost:8529").unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].host, "localhost");
        assert_eq!(endpoints[0].port, 8529);
    }

    #[test]
    fn test_parse_multiple_hosts_with_whitespace() {
        let endpoints = parse_host_list("db1:8529, db2:8530,db3:8531").unwrap();
        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints[1].host, "db2");
        assert_eq!(endpoints[2].port, 8531);
    }

    #[test]
    fn test_missing_port_rejects_whole_list() {
        assert!(parse_host_list("db1:8529,db2").is_err());
    }

    #[test]
    fn test_extra_colon_rejected() {
        assert!(parse_host_list("db1:8529:extra").is_err());
    }

    #[test]
    fn test_empty_parts_rejected() {
        assert!(parse_host_list(":8529").is_err());
        assert!(parse_host_list("db1:").is_err());
        assert!(parse_host_list("").is_err());
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        assert!(parse_host_list("db1:http").is_err());
    }

    #[test]
    fn test_auth_enabled_by_default_requires_credentials() {
        let options = ConnectionOptions::new().with_option("arango.hosts", "db1:8529");
        let err = ClientConfig::from_options(&options).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_auth_rejects_empty_username() {
        let options = ConnectionOptions::new()
            .with_option("arango.hosts", "db1:8529")
            .with_option("arango.auth.enabled", "true")
            .with_option("arango.auth.username", "")
            .with_option("arango.auth.password", "secret");
        let err = ClientConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("arango.auth.username"));
    }

    #[test]
    fn test_auth_rejects_missing_password() {
        let options = ConnectionOptions::new()
            .with_option("arango.hosts", "db1:8529")
            .with_option("arango.auth.username", "root");
        let err = ClientConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("arango.auth.password"));
    }

    #[test]
    fn test_auth_disabled_needs_no_credentials() {
        let config = ClientConfig::from_options(&base_options()).unwrap();
        assert!(!config.auth_enabled());
    }

    #[test]
    fn test_credentials_accepted() {
        let options = ConnectionOptions::new()
            .with_option("arango.hosts", "db1:8529")
            .with_option("arango.auth.username", "root")
            .with_option("arango.auth.password", "secret");
        let config = ClientConfig::from_options(&options).unwrap();
        let auth = config.auth.unwrap();
        assert_eq!(auth.username, "root");
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn test_unset_optionals_stay_unset() {
        let config = ClientConfig::from_options(&base_options()).unwrap();
        assert!(config.protocol.is_none());
        assert!(config.timeout.is_none());
        assert!(config.connection_ttl.is_none());
        assert!(config.chunk_size.is_none());
        assert!(config.max_connections.is_none());
        assert!(config.tls.is_none());
        assert!(config.acquire_host_list);
        assert_eq!(config.load_balancing, LoadBalancing::None);
    }

    #[test]
    fn test_all_options_applied() {
        let options = base_options()
            .with_option("arango.load.balancing", "round_robin")
            .with_option("arango.acquire.host.list", "false")
            .with_option("arango.protocol", "http_json")
            .with_option("arango.timeout.ms", "5000")
            .with_option("arango.connection.ttl.ms", "60000")
            .with_option("arango.chunk.size", "500")
            .with_option("arango.max.connections", "8")
            .with_option("arango.tls.enabled", "true");
        let config = ClientConfig::from_options(&options).unwrap();
        assert_eq!(config.load_balancing, LoadBalancing::RoundRobin);
        assert!(!config.acquire_host_list);
        assert_eq!(config.protocol, Some(WireProtocol::HttpJson));
        assert_eq!(config.timeout, Some(Duration::from_millis(5000)));
        assert_eq!(config.connection_ttl, Some(Duration::from_secs(60)));
        assert_eq!(config.chunk_size, Some(500));
        assert_eq!(config.max_connections, Some(8));
        assert!(config.tls.unwrap().enabled);
    }

    #[test]
    fn test_invalid_load_balancing_rejected() {
        let options = base_options().with_option("arango.load.balancing", "sticky");
        assert!(ClientConfig::from_options(&options).is_err());
    }

    #[test]
    fn test_invalid_numeric_option_rejected() {
        let options = base_options().with_option("arango.timeout.ms", "soon");
        let err = ClientConfig::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("arango.timeout.ms"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "root".into(),
            password: "hunter2".into(),
        };
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("root"));
        assert!(!dbg.contains("hunter2"));
    }
}
