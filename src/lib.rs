// ABOUTME: Library root for graphlink - SSH-tunneled graph database connectivity.
// ABOUTME: Wires configuration, path resolution, and the tunnel subsystem together.

pub mod config;
pub mod error;
pub mod paths;
pub mod tunnel;

pub use config::{ConnectionConfig, TunnelConfig, TunnelSettings};
pub use error::{Error, Result};
pub use tunnel::TunnelSession;

/// Prepare the tunnel for one logical connection.
///
/// With tunneling disabled this returns an inert session and leaves the
/// configuration untouched. Otherwise it derives the session parameters,
/// establishes the tunnel, and rewrites the endpoint so the downstream
/// protocol client transparently connects through the local forward.
///
/// The caller owns the returned session and must call
/// [`TunnelSession::disconnect`] on every exit path.
pub async fn establish_tunnel(config: &mut ConnectionConfig) -> Result<TunnelSession> {
    if !config.tunnel.enabled {
        return Ok(TunnelSession::disabled());
    }

    let tunnel_config = TunnelConfig::from_connection(config)?;
    let session = TunnelSession::establish(&tunnel_config).await?;
    config.tunnel_override(session.tunnel_port())?;
    Ok(session)
}
