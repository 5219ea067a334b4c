//! Directory-backed certificate store
//!
//! Bundles with a private key are written as `<alias>.p12`, encrypted with the
//! store passphrase. Public bundles are written as `<alias>.pem` holding the
//! certificate followed by its chain. Files are replaced by rename so readers
//! see either the old or the new content.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;

use super::encoding::{export_bundle, export_pem_chain, import_bundle, import_pem_chain};
use super::locks::AliasLocks;
use super::{CertificateBundle, CertificateStore, FingerprintListing, validate_alias};
use crate::error::StoreError;

const ARCHIVE_EXT: &str = "p12";
const PUBLIC_EXT: &str = "pem";

/// Certificate store persisting each alias as a file in one directory
pub struct FilesystemCertificateStore {
    base_path: PathBuf,
    passphrase: SecretString,
    writers: AliasLocks,
}

/// Builder for [`FilesystemCertificateStore`]
pub struct FilesystemCertificateStoreBuilder {
    base_path: PathBuf,
}

impl FilesystemCertificateStore {
    /// Start building a store rooted at `base_path`
    pub fn at<P: AsRef<Path>>(base_path: P) -> FilesystemCertificateStoreBuilder {
        FilesystemCertificateStoreBuilder {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the bundle files
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, alias: &str, ext: &str) -> PathBuf {
        self.base_path.join(format!("{alias}.{ext}"))
    }

    async fn load(&self, alias: &str) -> Result<Option<CertificateBundle>, StoreError> {
        match tokio::fs::read(self.path_for(alias, ARCHIVE_EXT)).await {
            Ok(bytes) => {
                return import_bundle(&bytes, self.passphrase.expose_secret()).map(Some);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::Io(e)),
        }

        match tokio::fs::read_to_string(self.path_for(alias, PUBLIC_EXT)).await {
            Ok(text) => {
                let mut certificates = import_pem_chain(&text)?;
                if certificates.is_empty() {
                    return Err(StoreError::MalformedEncoding(format!(
                        "No certificate in '{alias}.{PUBLIC_EXT}'"
                    )));
                }
                let leaf = certificates.remove(0);
                Ok(Some(CertificateBundle::new(leaf).with_chain(certificates)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_atomically(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let tmp_path = path.with_extension("tmp");
        // A leftover from an interrupted write keeps whatever mode it had
        remove_if_present(&tmp_path).await?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io(e)),
    }
}

impl FilesystemCertificateStoreBuilder {
    /// Set the passphrase protecting private keys and build the store
    #[must_use]
    pub fn with_passphrase(self, passphrase: SecretString) -> FilesystemCertificateStore {
        FilesystemCertificateStore {
            base_path: self.base_path,
            passphrase,
            writers: AliasLocks::default(),
        }
    }
}

#[async_trait]
impl CertificateStore for FilesystemCertificateStore {
    async fn put(&self, alias: &str, bundle: CertificateBundle) -> Result<(), StoreError> {
        validate_alias(alias)?;
        let _guard = self.writers.lock(alias).await;

        tokio::fs::create_dir_all(&self.base_path).await?;

        let (contents, ext, stale_ext) = if bundle.has_private_key() {
            let archive = export_bundle(&bundle, self.passphrase.expose_secret())?;
            (archive, ARCHIVE_EXT, PUBLIC_EXT)
        } else {
            (export_pem_chain(&bundle).into_bytes(), PUBLIC_EXT, ARCHIVE_EXT)
        };

        self.write_atomically(&self.path_for(alias, ext), &contents)
            .await?;
        remove_if_present(&self.path_for(alias, stale_ext)).await?;

        tracing::info!(
            "Stored certificate '{}' as {:?}",
            bundle.certificate().subject(),
            self.path_for(alias, ext)
        );
        Ok(())
    }

    async fn get(&self, alias: &str) -> Result<Arc<CertificateBundle>, StoreError> {
        validate_alias(alias)?;
        self.load(alias)
            .await?
            .map(Arc::new)
            .ok_or_else(|| StoreError::NotFound(alias.to_string()))
    }

    async fn remove(&self, alias: &str) -> Result<(), StoreError> {
        validate_alias(alias)?;
        let _guard = self.writers.lock(alias).await;

        let removed_archive = remove_if_present(&self.path_for(alias, ARCHIVE_EXT)).await?;
        let removed_public = remove_if_present(&self.path_for(alias, PUBLIC_EXT)).await?;
        if !(removed_archive || removed_public) {
            return Err(StoreError::NotFound(alias.to_string()));
        }

        tracing::info!("Removed alias '{}' from {:?}", alias, self.base_path);
        Ok(())
    }

    async fn list_by_fingerprint(&self) -> Result<FingerprintListing, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FingerprintListing::default());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut certificates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_bundle_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == ARCHIVE_EXT || ext == PUBLIC_EXT);
            let Some(alias) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_bundle_file || validate_alias(alias).is_err() {
                continue;
            }

            match self.load(alias).await {
                Ok(Some(bundle)) => certificates.push(bundle.certificate().clone()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Skipping unreadable store entry {:?}: {}", path, e);
                }
            }
        }

        Ok(FingerprintListing::from_unsorted(certificates))
    }
}
