// ABOUTME: SSH endpoint parsing for "host[:port]" strings.
// ABOUTME: Missing ports default to 22; malformed ports are configuration errors.

use super::error::{Error, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// A parsed SSH endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEndpoint {
    pub host: String,
    pub port: u16,
}

impl SshEndpoint {
    /// Parse "host" or "host:port". A missing port defaults to 22; a
    /// malformed port is an error rather than silently defaulted.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidEndpoint {
                input: input.to_string(),
                reason: "endpoint cannot be empty".to_string(),
            });
        }

        let (host, port) = if let Some(colon_pos) = input.rfind(':') {
            let port_str = &input[colon_pos + 1..];
            let port = port_str.parse::<u16>().map_err(|_| Error::InvalidEndpoint {
                input: input.to_string(),
                reason: format!("invalid port: {port_str}"),
            })?;
            (&input[..colon_pos], port)
        } else {
            (input, DEFAULT_SSH_PORT)
        };

        if host.is_empty() {
            return Err(Error::InvalidEndpoint {
                input: input.to_string(),
                reason: "hostname cannot be empty".to_string(),
            });
        }

        Ok(SshEndpoint {
            host: host.to_string(),
            port,
        })
    }
}
