// ABOUTME: Connection configuration contract and tunnel parameter derivation.
// ABOUTME: Holds the database endpoint URI and rewrites it once a tunnel is up.

use crate::error::{Error, Result};
use crate::tunnel::endpoint::SshEndpoint;
use crate::tunnel::session::TUNNEL_HOST;
use serde::Deserialize;
use std::time::Duration;

/// Default bounded timeout for the SSH handshake and authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Inbound configuration for one logical database connection.
///
/// The endpoint is a `scheme://host:port` URI naming the real graph
/// database endpoint. When tunneling is enabled, [`crate::establish_tunnel`]
/// rewrites it to point at the tunnel's local endpoint before the
/// downstream protocol client ever sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub endpoint: String,

    #[serde(default)]
    pub tunnel: TunnelSettings,
}

/// Tunnel-related settings within a connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    pub enabled: bool,
    /// SSH endpoint as "host" or "host:port".
    pub ssh_host: String,
    pub ssh_user: String,
    pub private_key_path: String,
    pub private_key_passphrase: Option<String>,
    /// Explicit known-hosts path; defaults to ~/.ssh/known_hosts.
    pub known_hosts_path: Option<String>,
    pub strict_host_key_checking: bool,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ssh_host: String::new(),
            ssh_user: String::new(),
            private_key_path: String::new(),
            private_key_passphrase: None,
            known_hosts_path: None,
            // Fail-closed unless the caller explicitly opts out.
            strict_host_key_checking: true,
        }
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tunnel: TunnelSettings::default(),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn scheme(&self) -> Result<&str> {
        Ok(self.split_endpoint()?.0)
    }

    /// Database host parsed from the endpoint URI.
    pub fn host(&self) -> Result<&str> {
        Ok(self.split_endpoint()?.1)
    }

    /// Database port parsed from the endpoint URI.
    pub fn port(&self) -> Result<u16> {
        Ok(self.split_endpoint()?.2)
    }

    /// Rewrite the endpoint to the tunnel's local endpoint, preserving the
    /// scheme. One-time projection: performed after tunnel establishment,
    /// before the downstream client connects, never re-evaluated.
    pub fn tunnel_override(&mut self, tunnel_port: u16) -> Result<()> {
        let scheme = self.scheme()?.to_string();
        self.endpoint = format!("{scheme}://{TUNNEL_HOST}:{tunnel_port}");
        Ok(())
    }

    fn split_endpoint(&self) -> Result<(&str, &str, u16)> {
        let invalid = |reason: &str| Error::InvalidEndpointUri {
            uri: self.endpoint.clone(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = self
            .endpoint
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        let (host, port_str) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if scheme.is_empty() {
            return Err(invalid("missing scheme"));
        }
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port_str
            .parse::<u16>()
            .map_err(|_| invalid("invalid port"))?;
        Ok((scheme, host, port))
    }
}

/// Derived parameters for one tunnel session.
///
/// Produced from a [`ConnectionConfig`] so that all configuration errors
/// (malformed endpoints in particular) fire before any network attempt.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    /// Path to the private key file; may use the `~/` home shorthand.
    pub private_key_path: String,
    pub key_passphrase: Option<String>,
    /// Explicit known-hosts path; None means ~/.ssh/known_hosts.
    pub known_hosts_path: Option<String>,
    pub strict_host_key_checking: bool,
    /// The real database endpoint, reachable only through the tunnel.
    pub target_host: String,
    pub target_port: u16,
    pub connect_timeout: Duration,
    /// Local port to bind the forwarding listener to; 0 lets the OS choose.
    pub local_bind_port: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ssh_host: String::new(),
            ssh_port: crate::tunnel::endpoint::DEFAULT_SSH_PORT,
            ssh_user: String::new(),
            private_key_path: String::new(),
            key_passphrase: None,
            known_hosts_path: None,
            strict_host_key_checking: true,
            target_host: String::new(),
            target_port: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            local_bind_port: 0,
        }
    }
}

impl TunnelConfig {
    /// Derive session parameters from a connection configuration.
    pub fn from_connection(config: &ConnectionConfig) -> Result<Self> {
        let ssh = SshEndpoint::parse(&config.tunnel.ssh_host)?;
        let target_host = config.host()?.to_string();
        let target_port = config.port()?;

        Ok(Self {
            ssh_host: ssh.host,
            ssh_port: ssh.port,
            ssh_user: config.tunnel.ssh_user.clone(),
            private_key_path: config.tunnel.private_key_path.clone(),
            key_passphrase: config.tunnel.private_key_passphrase.clone(),
            known_hosts_path: config.tunnel.known_hosts_path.clone(),
            strict_host_key_checking: config.tunnel.strict_host_key_checking,
            target_host,
            target_port,
            ..Self::default()
        })
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn local_bind_port(mut self, port: u16) -> Self {
        self.local_bind_port = port;
        self
    }
}
