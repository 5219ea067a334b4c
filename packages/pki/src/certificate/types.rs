//! Certificate and extension summary types

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// SHA-256 digest of a certificate's DER encoding
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of DER bytes
    #[must_use]
    pub fn of(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    /// Raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex without separators
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

/// Signature algorithm identified from the certificate's outer signature OID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// sha256WithRSAEncryption
    RsaPkcs1Sha256,
    /// sha384WithRSAEncryption
    RsaPkcs1Sha384,
    /// sha512WithRSAEncryption
    RsaPkcs1Sha512,
    /// ecdsa-with-SHA256
    EcdsaSha256,
    /// ecdsa-with-SHA384
    EcdsaSha384,
    /// Ed25519
    Ed25519,
    /// Anything else, by dotted OID
    Other(String),
}

impl SignatureAlgorithm {
    pub(crate) fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.113549.1.1.11" => SignatureAlgorithm::RsaPkcs1Sha256,
            "1.2.840.113549.1.1.12" => SignatureAlgorithm::RsaPkcs1Sha384,
            "1.2.840.113549.1.1.13" => SignatureAlgorithm::RsaPkcs1Sha512,
            "1.2.840.10045.4.3.2" => SignatureAlgorithm::EcdsaSha256,
            "1.2.840.10045.4.3.3" => SignatureAlgorithm::EcdsaSha384,
            "1.3.101.112" => SignatureAlgorithm::Ed25519,
            other => SignatureAlgorithm::Other(other.to_string()),
        }
    }
}

/// Basic constraints extension summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraintsInfo {
    /// cA flag
    pub ca: bool,
    /// pathLenConstraint
    pub path_len: Option<u32>,
}

/// Key usage extension summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsageInfo {
    /// digitalSignature
    pub digital_signature: bool,
    /// keyEncipherment
    pub key_encipherment: bool,
    /// keyCertSign
    pub key_cert_sign: bool,
    /// cRLSign
    pub crl_sign: bool,
}

/// Extended key usage extension summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedKeyUsageInfo {
    /// id-kp-serverAuth
    pub server_auth: bool,
    /// id-kp-clientAuth
    pub client_auth: bool,
}

#[derive(Debug)]
pub(crate) struct CertificateFields {
    pub der: Vec<u8>,
    pub fingerprint: Fingerprint,
    pub serial: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub subject_raw: Vec<u8>,
    pub issuer_raw: Vec<u8>,
    pub common_name: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key_algorithm: String,
    pub public_key_raw: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
    pub basic_constraints: Option<BasicConstraintsInfo>,
    pub key_usage: Option<KeyUsageInfo>,
    pub extended_key_usage: Option<ExtendedKeyUsageInfo>,
    pub san_dns_names: Vec<String>,
    pub san_ip_addresses: Vec<IpAddr>,
    pub crl_urls: Vec<String>,
}

/// Immutable parsed X.509 certificate
#[derive(Clone)]
pub struct Certificate {
    inner: Arc<CertificateFields>,
}

impl Certificate {
    pub(crate) fn from_fields(fields: CertificateFields) -> Self {
        Self {
            inner: Arc::new(fields),
        }
    }

    /// Parse a DER-encoded certificate
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncoding` if the bytes are not a single X.509 certificate
    pub fn from_der(der: &[u8]) -> Result<Self, StoreError> {
        super::parser::parse_der(der)
    }

    /// Parse the first `CERTIFICATE` block of a PEM document
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncoding` if no certificate block is present
    pub fn from_pem(pem_data: &str) -> Result<Self, StoreError> {
        super::parser::parse_pem_chain(pem_data)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StoreError::MalformedEncoding("No certificate in PEM data".to_string())
            })
    }

    /// Raw DER encoding
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.inner.der
    }

    /// PEM encoding
    #[must_use]
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.inner.der.clone()))
    }

    /// SHA-256 fingerprint of the DER encoding
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.inner.fingerprint
    }

    /// Serial number, big-endian without leading zero bytes
    #[must_use]
    pub fn serial(&self) -> &[u8] {
        &self.inner.serial
    }

    /// Serial number as colon-separated hex
    #[must_use]
    pub fn serial_hex(&self) -> String {
        self.inner
            .serial
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Subject distinguished name in RFC 4514 form
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.inner.subject
    }

    /// Issuer distinguished name in RFC 4514 form
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.inner.issuer
    }

    /// DER encoding of the subject name, used for chain linking
    #[must_use]
    pub fn subject_raw(&self) -> &[u8] {
        &self.inner.subject_raw
    }

    /// DER encoding of the issuer name, used for chain linking
    #[must_use]
    pub fn issuer_raw(&self) -> &[u8] {
        &self.inner.issuer_raw
    }

    /// First common name attribute of the subject
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.inner.common_name.as_deref()
    }

    /// Start of the validity window
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.inner.not_before
    }

    /// End of the validity window
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.inner.not_after
    }

    /// Whether `at` falls inside the validity window, both ends inclusive
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.inner.not_before <= at && at <= self.inner.not_after
    }

    /// Dotted OID of the subject public key algorithm
    #[must_use]
    pub fn public_key_algorithm(&self) -> &str {
        &self.inner.public_key_algorithm
    }

    /// Raw subject public key bits
    #[must_use]
    pub fn public_key_raw(&self) -> &[u8] {
        &self.inner.public_key_raw
    }

    /// Outer signature algorithm
    #[must_use]
    pub fn signature_algorithm(&self) -> &SignatureAlgorithm {
        &self.inner.signature_algorithm
    }

    /// Outer signature bytes
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.inner.signature
    }

    /// Basic constraints, if the extension is present
    #[must_use]
    pub fn basic_constraints(&self) -> Option<BasicConstraintsInfo> {
        self.inner.basic_constraints
    }

    /// Whether the certificate is marked as a CA
    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.inner.basic_constraints.is_some_and(|bc| bc.ca)
    }

    /// Key usage, if the extension is present
    #[must_use]
    pub fn key_usage(&self) -> Option<KeyUsageInfo> {
        self.inner.key_usage
    }

    /// Extended key usage, if the extension is present
    #[must_use]
    pub fn extended_key_usage(&self) -> Option<ExtendedKeyUsageInfo> {
        self.inner.extended_key_usage
    }

    /// DNS subject alternative names
    #[must_use]
    pub fn san_dns_names(&self) -> &[String] {
        &self.inner.san_dns_names
    }

    /// IP subject alternative names
    #[must_use]
    pub fn san_ip_addresses(&self) -> &[IpAddr] {
        &self.inner.san_ip_addresses
    }

    /// CRL distribution point URLs
    #[must_use]
    pub fn crl_urls(&self) -> &[String] {
        &self.inner.crl_urls
    }

    /// Issuer and subject names are identical
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.inner.subject_raw == self.inner.issuer_raw
    }

    /// Issuer equals subject and the signature verifies with the certificate's own key
    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.is_self_issued() && self.is_signed_by(self)
    }

    /// Verify this certificate's signature with `issuer`'s public key
    #[must_use]
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        super::parser::verify_signature(self.der(), issuer.der())
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.inner.der == other.inner.der
    }
}

impl Eq for Certificate {}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.inner.subject)
            .field("issuer", &self.inner.issuer)
            .field("serial", &self.serial_hex())
            .field("not_before", &self.inner.not_before)
            .field("not_after", &self.inner.not_after)
            .field("fingerprint", &self.inner.fingerprint)
            .finish()
    }
}
