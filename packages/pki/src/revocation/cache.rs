//! Pre-validation cache for revocation results
//!
//! TLS verifiers run synchronously inside the handshake, so revocation
//! answers are fetched ahead of time and read from here.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::RevocationStatus;
use crate::certificate::Fingerprint;

#[derive(Debug, Clone, Copy)]
struct CachedStatus {
    status: RevocationStatus,
    checked_at: Instant,
}

/// Revocation answers keyed by certificate fingerprint, expiring after a TTL
#[derive(Debug, Clone)]
pub struct RevocationCache {
    entries: Arc<RwLock<HashMap<Fingerprint, CachedStatus>>>,
    ttl: Duration,
}

impl RevocationCache {
    /// Cache whose entries expire after `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::with_capacity(64))),
            ttl,
        }
    }

    /// Fresh answer for `fingerprint`, if any
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<RevocationStatus> {
        let entry = match self.entries.read() {
            Ok(entries) => entries.get(fingerprint).copied(),
            Err(poisoned) => {
                tracing::warn!("Revocation cache read lock poisoned, recovering");
                poisoned.into_inner().get(fingerprint).copied()
            }
        }?;
        (entry.checked_at.elapsed() <= self.ttl).then_some(entry.status)
    }

    /// Record an answer
    pub fn insert(&self, fingerprint: Fingerprint, status: RevocationStatus) {
        let entry = CachedStatus {
            status,
            checked_at: Instant::now(),
        };
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(fingerprint, entry);
            }
            Err(poisoned) => {
                tracing::warn!("Revocation cache write lock poisoned, recovering");
                poisoned.into_inner().insert(fingerprint, entry);
            }
        }
    }

    /// Drop expired entries
    pub fn cleanup(&self) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => {
                tracing::warn!("Revocation cache write lock poisoned during cleanup, recovering");
                poisoned.into_inner()
            }
        };
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.checked_at.elapsed() <= ttl);
        tracing::debug!("Revocation cache cleanup completed, {} entries remaining", entries.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = RevocationCache::new(Duration::from_secs(60));
        let fp = Fingerprint::of(b"cert");
        assert_eq!(cache.get(&fp), None);
        cache.insert(fp, RevocationStatus::Revoked);
        assert_eq!(cache.get(&fp), Some(RevocationStatus::Revoked));
    }

    #[test]
    fn test_zero_ttl_expires() {
        let cache = RevocationCache::new(Duration::ZERO);
        let fp = Fingerprint::of(b"cert");
        cache.insert(fp, RevocationStatus::Good);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&fp), None);
        cache.cleanup();
    }
}
