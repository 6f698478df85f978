//! Revocation lookup used by the session guard

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tracing::{debug, warn};

/// Answers whether a previously issued token has been invalidated.
///
/// Keys are token fingerprints (see [`token_fingerprint`]), never raw tokens.
pub trait RevocationLookup: Send + Sync {
    fn is_revoked(&self, fingerprint: &str) -> bool;
}

/// SHA-256 hex digest of a token, used to store and look up sessions
pub fn token_fingerprint(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Shared in-memory set of revoked token fingerprints.
///
/// Each entry is kept only until its token would have expired anyway.
/// Cloning is cheap and every clone sees the same set.
#[derive(Debug, Clone, Default)]
pub struct RevocationList {
    revoked: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> RwLockWriteGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.revoked.write().unwrap_or_else(|poisoned| {
            warn!("Revocation list lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Mark a fingerprint as revoked until `expires_at`.
    ///
    /// Entries that have already expired are dropped on the way.
    pub fn revoke(&self, fingerprint: impl Into<String>, expires_at: DateTime<Utc>) {
        let now = Utc::now();
        let mut entries = self.entries();
        prune(&mut entries, now);
        if expires_at > now {
            entries.insert(fingerprint.into(), expires_at);
        }
    }

    /// Mark several `(fingerprint, expires_at)` pairs as revoked
    pub fn revoke_all<I, S>(&self, revoked: I)
    where
        I: IntoIterator<Item = (S, DateTime<Utc>)>,
        S: Into<String>,
    {
        let now = Utc::now();
        let mut entries = self.entries();
        prune(&mut entries, now);
        for (fingerprint, expires_at) in revoked {
            if expires_at > now {
                entries.insert(fingerprint.into(), expires_at);
            }
        }
    }

    /// Drop entries whose token has expired as of `now`. Returns how many
    /// were removed.
    pub fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        prune(&mut self.entries(), now)
    }

    pub fn len(&self) -> usize {
        self.revoked.read().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune(entries: &mut HashMap<String, DateTime<Utc>>, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|_, expires_at| *expires_at > now);
    let removed = before - entries.len();
    if removed > 0 {
        debug!(removed, "Pruned expired revocations");
    }
    removed
}

impl RevocationLookup for RevocationList {
    fn is_revoked(&self, fingerprint: &str) -> bool {
        // A poisoned lock fails closed
        self.revoked
            .read()
            .map(|set| set.contains_key(fingerprint))
            .unwrap_or(true)
    }
}
