// ABOUTME: Narrow SSH transport abstraction and its russh implementation.
// ABOUTME: Handles connect, host-key verification, auth, and direct-tcpip channels.

use super::error::{Error, Result};
use super::trust::TrustPolicy;
use crate::config::TunnelConfig;
use crate::paths;
use async_trait::async_trait;
use parking_lot::Mutex;
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::check_known_hosts_path;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{Disconnect, Preferred};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Duplex byte stream carried by a forwarded channel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> TunnelStream for T {}

/// The minimal transport surface the tunnel session needs: open a relay
/// channel to the target, and tear the session down. Keeping this narrow
/// lets tests substitute a fake that dials the target directly.
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    /// Open a channel relaying to `host:port` as seen from the SSH host.
    async fn open_channel(&self, host: &str, port: u16) -> Result<Box<dyn TunnelStream>>;

    /// Close the underlying session. Called at most once per transport.
    async fn close(&self) -> Result<()>;
}

/// Client handler enforcing the resolved trust policy at handshake time.
///
/// russh reports a rejected server key as a generic error, so the handler
/// records the precise rejection in a shared slot for the caller to
/// translate after `connect` fails.
struct TrustHandler {
    host: String,
    port: u16,
    policy: TrustPolicy,
    rejection: Arc<Mutex<Option<Error>>>,
}

impl client::Handler for TrustHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let store = match &self.policy {
            TrustPolicy::Disabled => {
                tracing::warn!(
                    host = %self.host,
                    port = self.port,
                    "accepting server key without verification (strict checking disabled)"
                );
                return Ok(true);
            }
            TrustPolicy::Enforced { store, .. } => store,
        };

        match check_known_hosts_path(&self.host, self.port, server_public_key, store) {
            Ok(true) => Ok(true),
            Ok(false) => {
                *self.rejection.lock() = Some(Error::UnknownHostKey {
                    host: self.host.clone(),
                    port: self.port,
                });
                Ok(false)
            }
            Err(russh::keys::Error::KeyChanged { .. }) => {
                *self.rejection.lock() = Some(Error::HostKeyChanged {
                    host: self.host.clone(),
                    port: self.port,
                });
                Ok(false)
            }
            Err(e) => {
                *self.rejection.lock() = Some(Error::TrustStoreInvalid {
                    path: store.clone(),
                    reason: e.to_string(),
                });
                Ok(false)
            }
        }
    }
}

/// Production transport over an authenticated russh session.
pub struct SshTransport {
    handle: Handle<TrustHandler>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl SshTransport {
    /// Connect and authenticate within the configured timeout.
    ///
    /// The private key is loaded and the trust policy applied before the
    /// handshake; any failure leaves no open resources behind (the handle
    /// is dropped, which closes the underlying socket).
    pub async fn connect(config: &TunnelConfig, policy: TrustPolicy) -> Result<Self> {
        let key_path = paths::resolve(&config.private_key_path);
        let key = load_secret_key(&key_path, config.key_passphrase.as_deref()).map_err(|e| {
            Error::KeyLoadFailed {
                path: key_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut preferred = Preferred::default();
        if let Some(alg) = policy.preferred_algorithm() {
            preferred.key = Cow::Owned(vec![alg.clone()]);
        }
        let russh_config = Arc::new(Config {
            inactivity_timeout: Some(Duration::from_secs(30)),
            preferred,
            ..Default::default()
        });

        let rejection = Arc::new(Mutex::new(None));
        let handler = TrustHandler {
            host: config.ssh_host.clone(),
            port: config.ssh_port,
            policy,
            rejection: Arc::clone(&rejection),
        };

        let connect = async {
            let mut handle = client::connect(
                russh_config,
                (config.ssh_host.as_str(), config.ssh_port),
                handler,
            )
            .await
            .map_err(|e| match rejection.lock().take() {
                Some(rejected) => rejected,
                None => Error::ConnectionFailed(e.to_string()),
            })?;

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(Error::Protocol)?
                .flatten();
            let auth = handle
                .authenticate_publickey(
                    &config.ssh_user,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(Error::Protocol)?;
            if !auth.success() {
                return Err(Error::AuthenticationFailed(config.ssh_user.clone()));
            }
            Ok(handle)
        };

        let handle = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| Error::ConnectTimeout(config.connect_timeout))??;

        Ok(Self { handle })
    }
}

#[async_trait]
impl TunnelTransport for SshTransport {
    async fn open_channel(&self, host: &str, port: u16) -> Result<Box<dyn TunnelStream>> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(Error::Protocol)?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn close(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::error::ErrorKind;
    use russh::client::Handler;
    use std::io::Write;
    use std::path::Path;

    // Real published ed25519 host keys (GitHub's and GitLab's).
    const STORED_LINE: &str =
        "bastion.example.com ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const STORED_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const OTHER_KEY: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAfuCHKVTjquxvt6CM6tdG4SLp1Btn/nOeHHE5UOzRdf";

    fn store_with_entry() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{STORED_LINE}").unwrap();
        file
    }

    fn enforced(store: &Path) -> TrustPolicy {
        TrustPolicy::Enforced {
            store: store.to_path_buf(),
            preferred_algorithm: None,
            hash_new_entries: true,
        }
    }

    fn handler(host: &str, policy: TrustPolicy) -> TrustHandler {
        TrustHandler {
            host: host.to_string(),
            port: 22,
            policy,
            rejection: Arc::new(Mutex::new(None)),
        }
    }

    fn parse_key(openssh: &str) -> ssh_key::PublicKey {
        openssh.parse().unwrap()
    }

    #[tokio::test]
    async fn enforced_accepts_a_matching_key() {
        let store = store_with_entry();
        let mut handler = handler("bastion.example.com", enforced(store.path()));

        let accepted = handler.check_server_key(&parse_key(STORED_KEY)).await.unwrap();

        assert!(accepted);
        assert!(handler.rejection.lock().is_none());
    }

    #[tokio::test]
    async fn enforced_rejects_a_host_absent_from_the_store() {
        let store = store_with_entry();
        let mut handler = handler("other-bastion.example.com", enforced(store.path()));

        let accepted = handler.check_server_key(&parse_key(STORED_KEY)).await.unwrap();

        assert!(!accepted);
        let rejection = handler.rejection.lock().take().expect("rejection recorded");
        assert!(matches!(rejection, Error::UnknownHostKey { .. }));
        assert_eq!(rejection.kind(), ErrorKind::TrustVerification);
    }

    #[tokio::test]
    async fn enforced_rejects_a_changed_key() {
        let store = store_with_entry();
        let mut handler = handler("bastion.example.com", enforced(store.path()));

        let accepted = handler.check_server_key(&parse_key(OTHER_KEY)).await.unwrap();

        assert!(!accepted);
        let rejection = handler.rejection.lock().take().expect("rejection recorded");
        assert!(matches!(rejection, Error::HostKeyChanged { .. }));
        assert_eq!(rejection.kind(), ErrorKind::TrustVerification);
    }

    #[tokio::test]
    async fn disabled_accepts_any_key_without_a_store() {
        let mut handler = handler("anywhere.example.com", TrustPolicy::Disabled);

        let accepted = handler.check_server_key(&parse_key(OTHER_KEY)).await.unwrap();

        assert!(accepted);
        assert!(handler.rejection.lock().is_none());
    }
}
