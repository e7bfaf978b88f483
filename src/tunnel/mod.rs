// ABOUTME: Secure-tunnel subsystem: SSH session, trust policy, local forwarding.
// ABOUTME: Lets the connection stack reach the database endpoint via a bastion host.

pub mod endpoint;
mod error;
pub mod session;
pub mod transport;
mod trust;

pub use endpoint::SshEndpoint;
pub use error::{Error, ErrorKind, Result};
pub use session::{TUNNEL_HOST, TunnelSession};
pub use transport::{TunnelStream, TunnelTransport};
pub use trust::{DEFAULT_KNOWN_HOSTS, TrustPolicy};
