//! Certificate storage
//!
//! - `bundle`: [`CertificateBundle`], the unit stored and exported
//! - `encoding`: DER, PEM and PKCS#12 encodings
//! - `memory`: in-process backend with lock-free snapshot reads
//! - `filesystem`: directory backend with PKCS#12 files
//!
//! Engine code depends only on the [`CertificateStore`] trait.

pub mod bundle;
pub mod encoding;
pub mod filesystem;
mod locks;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

pub use bundle::CertificateBundle;
pub use encoding::{
    export_bundle, export_pem_chain, export_public, import_bundle, import_pem_chain,
    import_public,
};
pub use filesystem::FilesystemCertificateStore;
pub use memory::MemoryCertificateStore;

use crate::certificate::Certificate;
use crate::error::StoreError;

const MAX_ALIAS_LEN: usize = 128;

/// Alias-addressed storage of certificate bundles
///
/// Mutations of one alias are serialized; reads never wait for writers.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Store `bundle` under `alias`, replacing any previous bundle
    async fn put(&self, alias: &str, bundle: CertificateBundle) -> Result<(), StoreError>;

    /// Fetch the bundle stored under `alias`
    async fn get(&self, alias: &str) -> Result<Arc<CertificateBundle>, StoreError>;

    /// Delete the bundle stored under `alias`
    async fn remove(&self, alias: &str) -> Result<(), StoreError>;

    /// Snapshot of all stored certificates ordered by fingerprint
    async fn list_by_fingerprint(&self) -> Result<FingerprintListing, StoreError>;
}

/// Ordered, restartable view over stored certificates
///
/// Each call to [`FingerprintListing::iter`] starts from the first
/// certificate; later store mutations are not reflected.
#[derive(Debug, Clone, Default)]
pub struct FingerprintListing {
    certificates: Arc<[Certificate]>,
}

impl FingerprintListing {
    pub(crate) fn from_unsorted(mut certificates: Vec<Certificate>) -> Self {
        certificates.sort_by_key(Certificate::fingerprint);
        certificates.dedup_by_key(|cert| cert.fingerprint());
        Self {
            certificates: certificates.into(),
        }
    }

    /// Iterate from the start, ascending by fingerprint
    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certificates.iter()
    }

    /// Number of distinct certificates
    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether the listing is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl<'a> IntoIterator for &'a FingerprintListing {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Aliases are 1 to 128 characters of `[A-Za-z0-9._-]`, not starting with a dot
pub(crate) fn validate_alias(alias: &str) -> Result<(), StoreError> {
    let well_formed = !alias.is_empty()
        && alias.len() <= MAX_ALIAS_LEN
        && !alias.starts_with('.')
        && alias
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if well_formed {
        Ok(())
    } else {
        Err(StoreError::InvalidAlias(alias.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_rules() {
        assert!(validate_alias("device-01.prod_a").is_ok());
        assert!(validate_alias("").is_err());
        assert!(validate_alias("../etc/passwd").is_err());
        assert!(validate_alias(".hidden").is_err());
        assert!(validate_alias("with space").is_err());
        assert!(validate_alias(&"a".repeat(129)).is_err());
        assert!(validate_alias(&"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_empty_listing() {
        let listing = FingerprintListing::default();
        assert!(listing.is_empty());
        assert_eq!(listing.iter().count(), 0);
    }
}
