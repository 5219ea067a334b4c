//! Local revocation deny list

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::{RevocationChecker, RevocationStatus};
use crate::certificate::{Certificate, Fingerprint};
use crate::error::RevocationError;

/// Revocation source backed by a fixed set of fingerprints
///
/// Useful offline and for pinning known-bad certificates ahead of CRL
/// publication. Everything not listed is reported as good.
#[derive(Debug, Clone, Default)]
pub struct StaticRevocationList {
    revoked: Arc<HashSet<Fingerprint>>,
}

impl StaticRevocationList {
    /// Empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this list with `certificate` revoked
    #[must_use]
    pub fn revoke(&self, certificate: &Certificate) -> Self {
        let mut revoked = HashSet::clone(&self.revoked);
        revoked.insert(certificate.fingerprint());
        Self {
            revoked: Arc::new(revoked),
        }
    }

    /// Whether `certificate` is listed
    #[must_use]
    pub fn is_revoked(&self, certificate: &Certificate) -> bool {
        self.revoked.contains(&certificate.fingerprint())
    }
}

#[async_trait]
impl RevocationChecker for StaticRevocationList {
    async fn check(
        &self,
        certificate: &Certificate,
        _issuer: &Certificate,
    ) -> Result<RevocationStatus, RevocationError> {
        Ok(if self.is_revoked(certificate) {
            RevocationStatus::Revoked
        } else {
            RevocationStatus::Good
        })
    }
}
