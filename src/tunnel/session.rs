// ABOUTME: Tunnel session lifecycle: connect, local port forwarding, disconnect.
// ABOUTME: Explicit Idle/Forwarding/Closed states; failures roll back before exposure.

use super::error::{Error, Result};
use super::transport::{SshTransport, TunnelTransport};
use super::trust::TrustPolicy;
use crate::config::TunnelConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::copy_bidirectional;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

/// Host the forwarded local endpoint is reported under.
pub const TUNNEL_HOST: &str = "localhost";

/// An SSH tunnel relaying a local ephemeral port to the database endpoint.
///
/// A session is either inert (`disabled`, tunneling not requested), actively
/// forwarding, or closed. Establishment failures never produce a session
/// value, so a half-initialized tunnel is not observable.
pub struct TunnelSession {
    state: State,
}

enum State {
    /// Tunneling not requested. Terminal and inert.
    Idle,
    Forwarding(Forwarding),
    Closed,
}

struct Forwarding {
    transport: Arc<dyn TunnelTransport>,
    local_port: u16,
    shutdown: Arc<AtomicBool>,
    shutdown_complete: Arc<Notify>,
    /// Cleared by the forwarder task when its accept loop exits, so a dead
    /// listener is never reported as a live local port.
    alive: Arc<AtomicBool>,
}

impl std::fmt::Debug for TunnelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Idle => "Idle".to_string(),
            State::Forwarding(fwd) => format!("Forwarding(local_port={})", fwd.local_port),
            State::Closed => "Closed".to_string(),
        };
        f.debug_struct("TunnelSession").field("state", &state).finish()
    }
}

impl TunnelSession {
    /// An inert session for configurations that do not request tunneling.
    pub fn disabled() -> Self {
        Self { state: State::Idle }
    }

    /// Connect to the SSH host, verify its identity per the resolved trust
    /// policy, authenticate, and start forwarding a local port to the
    /// configured target.
    pub async fn establish(config: &TunnelConfig) -> Result<Self> {
        let policy = TrustPolicy::resolve(config)?;
        let transport = SshTransport::connect(config, policy).await?;
        let session = Self::with_transport(Arc::new(transport), config).await?;
        tracing::info!(
            ssh_host = %config.ssh_host,
            target = %format!("{}:{}", config.target_host, config.target_port),
            local_port = session.tunnel_port(),
            "tunnel established"
        );
        Ok(session)
    }

    /// Start forwarding over an already-connected transport.
    ///
    /// Binds the local listener on the advertised tunnel host
    /// (`config.local_bind_port`, 0 for an OS-assigned port) and spawns the
    /// relay task. On bind failure the transport is closed before the error
    /// is returned.
    pub async fn with_transport(
        transport: Arc<dyn TunnelTransport>,
        config: &TunnelConfig,
    ) -> Result<Self> {
        // Bind the same name we advertise, so clients dialing the reported
        // endpoint always reach the listener regardless of resolver order.
        let listener = match TcpListener::bind((TUNNEL_HOST, config.local_bind_port)).await {
            Ok(listener) => listener,
            Err(e) => {
                close_logging(&*transport).await;
                return Err(Error::ForwardBindFailed(e));
            }
        };
        let local_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                close_logging(&*transport).await;
                return Err(Error::ForwardBindFailed(e));
            }
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_complete = Arc::new(Notify::new());
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_forwarder(
            listener,
            Arc::clone(&transport),
            config.target_host.clone(),
            config.target_port,
            Arc::clone(&shutdown),
            Arc::clone(&shutdown_complete),
            Arc::clone(&alive),
        ));

        Ok(Self {
            state: State::Forwarding(Forwarding {
                transport,
                local_port,
                shutdown,
                shutdown_complete,
                alive,
            }),
        })
    }

    /// Whether the tunnel is live and forwarding.
    pub fn is_valid(&self) -> bool {
        match &self.state {
            State::Forwarding(fwd) => fwd.alive.load(Ordering::SeqCst),
            State::Idle | State::Closed => false,
        }
    }

    /// Host of the forwarded local endpoint.
    pub fn tunnel_host(&self) -> &'static str {
        TUNNEL_HOST
    }

    /// Port of the forwarded local endpoint, or 0 when not forwarding.
    pub fn tunnel_port(&self) -> u16 {
        self.local_port().unwrap_or(0)
    }

    /// Port of the forwarded local endpoint, if forwarding.
    pub fn local_port(&self) -> Option<u16> {
        match &self.state {
            State::Forwarding(fwd) if fwd.alive.load(Ordering::SeqCst) => Some(fwd.local_port),
            _ => None,
        }
    }

    /// Stop forwarding and close the SSH session.
    ///
    /// Idempotent: safe on an idle, closed, or already-disconnected
    /// session. Teardown failures are logged, not returned, since resource
    /// release has already begun.
    pub async fn disconnect(&mut self) {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Idle => self.state = State::Idle,
            State::Closed => {}
            State::Forwarding(fwd) => {
                fwd.shutdown.store(true, Ordering::SeqCst);
                tokio::select! {
                    _ = fwd.shutdown_complete.notified() => {}
                    _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
                }
                close_logging(&*fwd.transport).await;
            }
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        // Stops the listener task. The SSH session itself is closed by the
        // transport handle being dropped; explicit disconnect is still the
        // clean path.
        if let State::Forwarding(fwd) = &self.state {
            fwd.shutdown.store(true, Ordering::SeqCst);
        }
    }
}

async fn close_logging(transport: &dyn TunnelTransport) {
    if let Err(e) = transport.close().await {
        tracing::warn!("error closing SSH transport: {e}");
    }
}

/// Accept loop: relay each local connection through its own channel.
async fn run_forwarder(
    listener: TcpListener,
    transport: Arc<dyn TunnelTransport>,
    target_host: String,
    target_port: u16,
    shutdown: Arc<AtomicBool>,
    shutdown_complete: Arc<Notify>,
    alive: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        // Accept with a timeout so the shutdown flag is polled.
        let accept_result = tokio::select! {
            result = listener.accept() => result,
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => continue,
        };

        match accept_result {
            Ok((stream, _addr)) => {
                let transport = Arc::clone(&transport);
                let target_host = target_host.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        relay_connection(stream, &*transport, &target_host, target_port).await
                    {
                        tracing::debug!("tunnel relay error: {e}");
                    }
                });
            }
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    tracing::warn!("accept error on tunnel listener: {e}");
                }
                break;
            }
        }
    }

    // Whatever ended the loop, the listener is gone with it.
    alive.store(false, Ordering::SeqCst);
    shutdown_complete.notify_one();
}

/// Relay one accepted connection through a freshly opened channel.
async fn relay_connection(
    mut local: TcpStream,
    transport: &dyn TunnelTransport,
    target_host: &str,
    target_port: u16,
) -> Result<()> {
    let mut channel = transport.open_channel(target_host, target_port).await?;
    // EOF from either side ends the relay; not an error.
    let _ = copy_bidirectional(&mut local, &mut channel).await;
    Ok(())
}
