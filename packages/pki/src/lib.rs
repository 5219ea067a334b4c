//! Certificate-based mutual-TLS trust engine
//!
//! This crate provides:
//! - Key generation (RSA, ECDSA P-256/P-384, Ed25519) with zeroizing storage
//! - Root, intermediate and device certificate issuance
//! - Certificate storage with DER, PEM and PKCS#12 encodings
//! - Chain validation against an immutable, hot-reloadable trust policy
//! - Revocation checks through CRLs or local deny lists
//! - Handshake-time peer authentication and `rustls` configurations
//!
//! Issuance path: [`KeyMaterial`] → [`CertificateBuilder`] → [`CertificateStore`].
//! Verification path: presented bytes → [`ChainValidator`] →
//! [`SecureSessionAuthenticator`] → transport.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use cryypt_pki::{
//!     CertificateBuilder, ChainValidator, IssuerRef, KeyAlgorithm, KeyMaterial, RequestBuilder,
//!     TrustPolicy,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cryypt_pki::Result<()> {
//! let keys = KeyMaterial::default();
//! let builder = CertificateBuilder::new();
//!
//! let root = builder.issue(
//!     RequestBuilder::root_ca("Fleet Root", keys.generate(KeyAlgorithm::EcP256)?).build(),
//!     IssuerRef::SelfSigned,
//! )?;
//! let device = builder.issue(
//!     RequestBuilder::device("device-01", keys.generate(KeyAlgorithm::EcP256)?).build(),
//!     IssuerRef::from_bundle(&root)?,
//! )?;
//!
//! let policy = TrustPolicy::default().with_anchor(root.certificate().clone());
//! let result = ChainValidator::default()
//!     .validate(device.certificate(), device.chain(), &policy, Utc::now(), Some("device-01"))
//!     .await;
//! assert!(result.is_trusted());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod certificate;
pub mod config;
mod error;
pub mod key_material;
pub mod policy;
pub mod revocation;
pub mod session;
pub mod store;
pub mod validator;

pub use builder::{
    CertificateBuilder, CertificateRequest, ExtendedKeyUsage, IssuerRef, KeyUsage,
    RequestBuilder, SubjectName,
};
pub use certificate::{Certificate, Fingerprint};
pub use config::EngineConfig;
pub use error::*;
pub use key_material::{KeyAlgorithm, KeyMaterial, KeyPair};
pub use policy::{HostnameMode, PolicyHandle, RevocationMode, TrustAnchorSet, TrustPolicy};
pub use revocation::{
    CrlRevocationChecker, RevocationCache, RevocationChecker, RevocationStatus,
    StaticRevocationList,
};
pub use session::{HandshakeDecision, HandshakeHook, PeerVerifier, SecureSessionAuthenticator};
pub use store::{
    CertificateBundle, CertificateStore, FilesystemCertificateStore, FingerprintListing,
    MemoryCertificateStore,
};
pub use validator::{
    ChainValidationResult, ChainValidator, PolicyViolation, TrustOutcome, ViolationKind,
};
