//! Certificate bundle: the exportable unit

use crate::certificate::Certificate;
use crate::key_material::KeyPair;

/// A certificate with its optional private key and intermediate chain
///
/// The chain is ordered from the certificate's issuer upwards.
#[derive(Debug)]
pub struct CertificateBundle {
    certificate: Certificate,
    private_key: Option<KeyPair>,
    chain: Vec<Certificate>,
}

impl CertificateBundle {
    /// Bundle holding only a certificate
    #[must_use]
    pub fn new(certificate: Certificate) -> Self {
        Self {
            certificate,
            private_key: None,
            chain: Vec::new(),
        }
    }

    /// Attach the certificate's private key
    #[must_use]
    pub fn with_private_key(self, key: KeyPair) -> Self {
        Self {
            private_key: Some(key),
            ..self
        }
    }

    /// Replace the intermediate chain
    #[must_use]
    pub fn with_chain(self, chain: Vec<Certificate>) -> Self {
        Self { chain, ..self }
    }

    /// The end-entity certificate
    #[must_use]
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Private key, if the bundle owns one and it has not been disposed
    #[must_use]
    pub fn private_key(&self) -> Option<&KeyPair> {
        self.private_key.as_ref().filter(|key| !key.is_disposed())
    }

    /// Intermediate chain, issuer first
    #[must_use]
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Whether a usable private key is present
    #[must_use]
    pub fn has_private_key(&self) -> bool {
        self.private_key().is_some()
    }

    /// Whether the private key belongs to the certificate
    #[must_use]
    pub fn key_matches_certificate(&self) -> bool {
        self.private_key
            .as_ref()
            .is_some_and(|key| key.public_key_raw() == self.certificate.public_key_raw())
    }

    /// Copy of the bundle without its private key
    #[must_use]
    pub fn public_only(&self) -> Self {
        Self {
            certificate: self.certificate.clone(),
            private_key: None,
            chain: self.chain.clone(),
        }
    }

    /// Zeroize the private key in place
    pub fn dispose_private_key(&mut self) {
        if let Some(key) = self.private_key.as_mut() {
            key.dispose();
        }
    }

    /// Leaf followed by the chain
    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        std::iter::once(&self.certificate).chain(self.chain.iter())
    }
}
