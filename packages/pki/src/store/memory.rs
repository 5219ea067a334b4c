//! In-memory certificate store

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use super::locks::AliasLocks;
use super::{CertificateBundle, CertificateStore, FingerprintListing, validate_alias};
use crate::error::StoreError;

type Snapshot = HashMap<String, Arc<CertificateBundle>>;

/// Process-local store
///
/// Readers load an immutable snapshot; writers take a per-alias lock and
/// publish a new snapshot.
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    snapshot: ArcSwap<Snapshot>,
    writers: AliasLocks,
}

impl MemoryCertificateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored aliases
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn put(&self, alias: &str, bundle: CertificateBundle) -> Result<(), StoreError> {
        validate_alias(alias)?;
        let _guard = self.writers.lock(alias).await;

        let bundle = Arc::new(bundle);
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.insert(alias.to_string(), Arc::clone(&bundle));
            next
        });

        tracing::info!(
            "Stored certificate '{}' under alias '{}'",
            bundle.certificate().subject(),
            alias
        );
        Ok(())
    }

    async fn get(&self, alias: &str) -> Result<Arc<CertificateBundle>, StoreError> {
        validate_alias(alias)?;
        self.snapshot
            .load()
            .get(alias)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(alias.to_string()))
    }

    async fn remove(&self, alias: &str) -> Result<(), StoreError> {
        validate_alias(alias)?;
        let _guard = self.writers.lock(alias).await;

        if !self.snapshot.load().contains_key(alias) {
            return Err(StoreError::NotFound(alias.to_string()));
        }
        self.snapshot.rcu(|current| {
            let mut next = Snapshot::clone(current);
            next.remove(alias);
            next
        });

        tracing::info!("Removed alias '{}'", alias);
        Ok(())
    }

    async fn list_by_fingerprint(&self) -> Result<FingerprintListing, StoreError> {
        let snapshot = self.snapshot.load_full();
        Ok(FingerprintListing::from_unsorted(
            snapshot
                .values()
                .map(|bundle| bundle.certificate().clone())
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CertificateBuilder, IssuerRef, RequestBuilder};
    use crate::key_material::{KeyAlgorithm, KeyMaterial};

    #[tokio::test]
    async fn test_alias_locks_do_not_outlive_writes() {
        let key = KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation");
        let bundle = CertificateBuilder::new()
            .issue(RequestBuilder::device("device-01", key).build(), IssuerRef::SelfSigned)
            .expect("issuance");
        let store = MemoryCertificateStore::new();

        for i in 0..16 {
            let alias = format!("device-{i}");
            store.put(&alias, bundle.public_only()).await.expect("put");
            store.remove(&alias).await.expect("remove");
        }

        assert!(store.is_empty());
        assert_eq!(store.writers.len(), 0);
    }
}
