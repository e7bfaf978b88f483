// ABOUTME: Host-key trust policy resolution from tunnel configuration.
// ABOUTME: Fail-closed: strict checking requires a readable known-hosts store.

use super::error::{Error, Result};
use crate::config::TunnelConfig;
use crate::paths;
use russh::keys::ssh_key::Algorithm;
use russh::keys::ssh_key::known_hosts::KnownHosts;
use std::path::{Path, PathBuf};

pub const DEFAULT_KNOWN_HOSTS: &str = "~/.ssh/known_hosts";

/// The resolved host-key verification policy for a session.
///
/// Derived once per session setup, before any network I/O, so that a
/// missing or unreadable trust store surfaces as a configuration error
/// rather than a connection-time failure.
#[derive(Debug, Clone)]
pub enum TrustPolicy {
    /// Skip host-key verification entirely. An explicit, caller-opted
    /// trust downgrade.
    Disabled,
    /// Verify the peer against the known-hosts store at `store`.
    Enforced {
        store: PathBuf,
        /// Key algorithm of the first store entry, preferred during
        /// server-key negotiation so the peer offers a key we can match.
        preferred_algorithm: Option<Algorithm>,
        /// Hash host names when new entries are persisted to the store.
        hash_new_entries: bool,
    },
}

impl TrustPolicy {
    /// Resolve the policy from the tunnel configuration.
    ///
    /// With strict checking disabled the store is never consulted. With
    /// strict checking enabled the store (explicit path, else
    /// `~/.ssh/known_hosts`) must exist and parse.
    pub fn resolve(config: &TunnelConfig) -> Result<Self> {
        if !config.strict_host_key_checking {
            tracing::warn!(
                host = %config.ssh_host,
                "strict host-key checking disabled; peer identity will not be verified"
            );
            return Ok(TrustPolicy::Disabled);
        }

        let raw_path = config
            .known_hosts_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_KNOWN_HOSTS);
        let store = paths::resolve(raw_path);

        if !store.exists() {
            return Err(Error::TrustStoreNotFound(store));
        }

        let entries = KnownHosts::read_file(&store).map_err(|e| Error::TrustStoreInvalid {
            path: store.clone(),
            reason: e.to_string(),
        })?;

        let preferred_algorithm = entries.first().map(|entry| entry.public_key().algorithm());

        Ok(TrustPolicy::Enforced {
            store,
            preferred_algorithm,
            hash_new_entries: true,
        })
    }

    pub fn is_enforced(&self) -> bool {
        matches!(self, TrustPolicy::Enforced { .. })
    }

    pub fn store(&self) -> Option<&Path> {
        match self {
            TrustPolicy::Disabled => None,
            TrustPolicy::Enforced { store, .. } => Some(store),
        }
    }

    pub fn preferred_algorithm(&self) -> Option<&Algorithm> {
        match self {
            TrustPolicy::Disabled => None,
            TrustPolicy::Enforced {
                preferred_algorithm,
                ..
            } => preferred_algorithm.as_ref(),
        }
    }
}
