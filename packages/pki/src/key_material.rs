//! Asymmetric key material for signing and certificate issuance
//!
//! Private keys are held as PKCS#8 DER inside zeroizing buffers. The signer
//! handle handed to the certificate builder is rebuilt on demand and dropped
//! right after use so the decoded key lives only for the signing call.

use std::fmt;
use std::str::FromStr;

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::traits::PublicKeyParts;
use zeroize::{Zeroize, Zeroizing};

use crate::config::{EngineConfig, RSA_FLOOR_BITS};
use crate::error::KeyError;

/// Largest RSA modulus the signer accepts
const RSA_CEILING_BITS: u32 = 8192;

/// Key algorithm and strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA with the given modulus size, signing with PKCS#1 v1.5 SHA-256
    Rsa {
        /// Modulus size in bits
        bits: u32,
    },
    /// ECDSA on NIST P-256 with SHA-256
    EcP256,
    /// ECDSA on NIST P-384 with SHA-384
    EcP384,
    /// Ed25519
    Ed25519,
}

impl KeyAlgorithm {
    /// Nominal security parameter in bits (modulus size or curve size)
    #[must_use]
    pub fn strength_bits(&self) -> u32 {
        match self {
            KeyAlgorithm::Rsa { bits } => *bits,
            KeyAlgorithm::EcP256 | KeyAlgorithm::Ed25519 => 256,
            KeyAlgorithm::EcP384 => 384,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa { bits } => write!(f, "rsa-{bits}"),
            KeyAlgorithm::EcP256 => f.write_str("ec-p256"),
            KeyAlgorithm::EcP384 => f.write_str("ec-p384"),
            KeyAlgorithm::Ed25519 => f.write_str("ed25519"),
        }
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "ec-p256" | "p-256" | "p256" | "ecdsa-p256" | "secp256r1" | "prime256v1" => {
                Ok(KeyAlgorithm::EcP256)
            }
            "ec-p384" | "p-384" | "p384" | "ecdsa-p384" | "secp384r1" => Ok(KeyAlgorithm::EcP384),
            "ed25519" => Ok(KeyAlgorithm::Ed25519),
            "rsa" => Ok(KeyAlgorithm::Rsa {
                bits: RSA_FLOOR_BITS,
            }),
            other => {
                let bits = other
                    .strip_prefix("rsa-")
                    .or_else(|| other.strip_prefix("rsa"))
                    .and_then(|b| b.parse::<u32>().ok())
                    .ok_or_else(|| KeyError::UnsupportedAlgorithm(s.to_string()))?;
                Ok(KeyAlgorithm::Rsa { bits })
            }
        }
    }
}

/// Asymmetric key pair with exclusively owned private material
pub struct KeyPair {
    algorithm: KeyAlgorithm,
    public_key_der: Vec<u8>,
    public_key_raw: Vec<u8>,
    private_pkcs8: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    /// Restore a key pair from PKCS#8 DER (for example after archive import)
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a supported PKCS#8 private key
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, KeyError> {
        let pem = Zeroizing::new(pem::encode(&pem::Pem::new("PRIVATE KEY", der.to_vec())));
        let signer = rcgen::KeyPair::from_pem(&pem)
            .map_err(|e| KeyError::InvalidKeyFormat(format!("Unsupported PKCS#8 key: {e}")))?;

        let algorithm = if signer.algorithm() == &rcgen::PKCS_ECDSA_P256_SHA256 {
            KeyAlgorithm::EcP256
        } else if signer.algorithm() == &rcgen::PKCS_ECDSA_P384_SHA384 {
            KeyAlgorithm::EcP384
        } else if signer.algorithm() == &rcgen::PKCS_ED25519 {
            KeyAlgorithm::Ed25519
        } else {
            let rsa_key = rsa::RsaPrivateKey::from_pkcs8_der(der).map_err(|e| {
                KeyError::InvalidKeyFormat(format!("Unrecognized key algorithm: {e}"))
            })?;
            #[allow(clippy::cast_possible_truncation)]
            let bits = (rsa_key.size() * 8) as u32;
            KeyAlgorithm::Rsa { bits }
        };

        Ok(Self::from_signer(algorithm, &signer, Zeroizing::new(der.to_vec())))
    }

    fn from_signer(
        algorithm: KeyAlgorithm,
        signer: &rcgen::KeyPair,
        private_pkcs8: Zeroizing<Vec<u8>>,
    ) -> Self {
        Self {
            algorithm,
            public_key_der: rcgen::PublicKeyData::subject_public_key_info(signer),
            public_key_raw: signer.public_key_raw().to_vec(),
            private_pkcs8,
        }
    }

    /// Key algorithm
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// DER-encoded SubjectPublicKeyInfo
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    /// Raw subject public key bits as they appear inside a certificate
    #[must_use]
    pub fn public_key_raw(&self) -> &[u8] {
        &self.public_key_raw
    }

    /// PKCS#8 private key, `None` once disposed
    #[must_use]
    pub fn private_key_pkcs8(&self) -> Option<&[u8]> {
        if self.private_pkcs8.is_empty() {
            None
        } else {
            Some(&self.private_pkcs8)
        }
    }

    /// Whether the private half has been cleared
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.private_pkcs8.is_empty()
    }

    /// Zeroize the private key now; the public half stays usable
    pub fn dispose(&mut self) {
        self.private_pkcs8.zeroize();
        tracing::debug!("Disposed {} private key material", self.algorithm);
    }

    /// Build a short-lived signer for one issuance
    pub(crate) fn signer(&self) -> Result<rcgen::KeyPair, KeyError> {
        if self.is_disposed() {
            return Err(KeyError::InvalidKeyFormat(
                "Private key has been disposed".to_string(),
            ));
        }
        let pem = Zeroizing::new(pem::encode(&pem::Pem::new(
            "PRIVATE KEY",
            self.private_pkcs8.to_vec(),
        )));
        rcgen::KeyPair::from_pem(&pem)
            .map_err(|e| KeyError::InvalidKeyFormat(format!("Failed to load signing key: {e}")))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key", &hex::encode(&self.public_key_raw))
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Key pair generator bound to a minimum-strength policy
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    min_rsa_bits: u32,
}

impl Default for KeyMaterial {
    fn default() -> Self {
        Self {
            min_rsa_bits: RSA_FLOOR_BITS,
        }
    }
}

impl KeyMaterial {
    /// Create a generator using the configured RSA minimum
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            min_rsa_bits: config.min_rsa_bits.max(RSA_FLOOR_BITS),
        }
    }

    /// Generate a key pair
    ///
    /// # Errors
    ///
    /// Returns `WeakParameter` below the RSA minimum, `UnsupportedAlgorithm`
    /// for sizes the signer cannot use, or `Generation` if the RNG fails
    pub fn generate(&self, algorithm: KeyAlgorithm) -> Result<KeyPair, KeyError> {
        match algorithm {
            KeyAlgorithm::Rsa { bits } => self.generate_rsa(bits),
            KeyAlgorithm::EcP256 => Self::generate_with(algorithm, &rcgen::PKCS_ECDSA_P256_SHA256),
            KeyAlgorithm::EcP384 => Self::generate_with(algorithm, &rcgen::PKCS_ECDSA_P384_SHA384),
            KeyAlgorithm::Ed25519 => Self::generate_with(algorithm, &rcgen::PKCS_ED25519),
        }
    }

    /// Generate a key pair on the blocking pool; RSA generation can take seconds
    ///
    /// # Errors
    ///
    /// Same as [`KeyMaterial::generate`], plus `Generation` if the task panics
    pub async fn generate_async(&self, algorithm: KeyAlgorithm) -> Result<KeyPair, KeyError> {
        let generator = self.clone();
        tokio::task::spawn_blocking(move || generator.generate(algorithm))
            .await
            .map_err(|e| KeyError::Generation(format!("Key generation task failed: {e}")))?
    }

    fn generate_with(
        algorithm: KeyAlgorithm,
        alg: &'static rcgen::SignatureAlgorithm,
    ) -> Result<KeyPair, KeyError> {
        let signer = rcgen::KeyPair::generate_for(alg)
            .map_err(|e| KeyError::Generation(format!("Failed to generate {algorithm}: {e}")))?;
        let private_pkcs8 = Zeroizing::new(signer.serialize_der());
        tracing::debug!("Generated {} key pair", algorithm);
        Ok(KeyPair::from_signer(algorithm, &signer, private_pkcs8))
    }

    fn generate_rsa(&self, bits: u32) -> Result<KeyPair, KeyError> {
        if bits < self.min_rsa_bits {
            return Err(KeyError::WeakParameter {
                algorithm: "RSA".to_string(),
                bits,
                minimum: self.min_rsa_bits,
            });
        }
        if bits > RSA_CEILING_BITS || bits % 1024 != 0 {
            return Err(KeyError::UnsupportedAlgorithm(format!("rsa-{bits}")));
        }

        let mut rng = rand_core_06::OsRng;
        let private_key = rsa::RsaPrivateKey::new(&mut rng, bits as usize)
            .map_err(|e| KeyError::Generation(format!("RSA key generation failed: {e}")))?;
        let document = private_key
            .to_pkcs8_der()
            .map_err(|e| KeyError::InvalidKeyFormat(format!("Private key encoding failed: {e}")))?;
        let private_pkcs8 = Zeroizing::new(document.as_bytes().to_vec());

        let pem = Zeroizing::new(pem::encode(&pem::Pem::new(
            "PRIVATE KEY",
            private_pkcs8.to_vec(),
        )));
        let signer = rcgen::KeyPair::from_pem(&pem)
            .map_err(|e| KeyError::Generation(format!("RSA key rejected by signer: {e}")))?;

        tracing::debug!("Generated rsa-{} key pair", bits);
        Ok(KeyPair::from_signer(
            KeyAlgorithm::Rsa { bits },
            &signer,
            private_pkcs8,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_algorithm_names() {
        assert_eq!("ec-p256".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EcP256);
        assert_eq!("P-384".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EcP384);
        assert_eq!("Ed25519".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ed25519);
        assert_eq!(
            "RSA-4096".parse::<KeyAlgorithm>().unwrap(),
            KeyAlgorithm::Rsa { bits: 4096 }
        );
        assert!(matches!(
            "dsa-1024".parse::<KeyAlgorithm>(),
            Err(KeyError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_rsa_below_minimum_is_weak() {
        let err = KeyMaterial::default()
            .generate(KeyAlgorithm::Rsa { bits: 1024 })
            .unwrap_err();
        assert!(matches!(
            err,
            KeyError::WeakParameter {
                bits: 1024,
                minimum: 2048,
                ..
            }
        ));
    }

    #[test]
    fn test_configured_minimum_applies() {
        let material = KeyMaterial::new(&EngineConfig::production());
        let err = material
            .generate(KeyAlgorithm::Rsa { bits: 2048 })
            .unwrap_err();
        assert!(matches!(err, KeyError::WeakParameter { minimum: 3072, .. }));
    }

    #[test]
    fn test_odd_rsa_size_is_unsupported() {
        let err = KeyMaterial::default()
            .generate(KeyAlgorithm::Rsa { bits: 2500 })
            .unwrap_err();
        assert!(matches!(err, KeyError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_ec_key_and_dispose() {
        let mut key = KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("P-256 generation");
        assert_eq!(key.algorithm(), KeyAlgorithm::EcP256);
        // Uncompressed point: 0x04 || X || Y
        assert_eq!(key.public_key_raw().len(), 65);
        assert!(key.private_key_pkcs8().is_some());
        assert!(key.signer().is_ok());

        key.dispose();
        assert!(key.is_disposed());
        assert!(key.private_key_pkcs8().is_none());
        assert!(key.signer().is_err());
        assert_eq!(key.public_key_raw().len(), 65);
    }

    #[test]
    fn test_pkcs8_restore_detects_algorithm() {
        let key = KeyMaterial::default()
            .generate(KeyAlgorithm::Ed25519)
            .expect("Ed25519 generation");
        let der = key.private_key_pkcs8().expect("private key").to_vec();
        let restored = KeyPair::from_pkcs8_der(&der).expect("restore");
        assert_eq!(restored.algorithm(), KeyAlgorithm::Ed25519);
        assert_eq!(restored.public_key_raw(), key.public_key_raw());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("P-256 generation");
        let debug = format!("{key:?}");
        assert!(debug.contains("EcP256"));
        assert!(!debug.contains("private_pkcs8"));
    }
}
