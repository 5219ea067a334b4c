//! Error taxonomy for issuance, storage, revocation and configuration
//!
//! Chain validation never returns these errors: policy failures are reported
//! as data in [`crate::validator::ChainValidationResult`] so transport code can
//! make a deterministic accept/reject decision.

use thiserror::Error;

/// Key generation errors
#[derive(Debug, Error)]
pub enum KeyError {
    /// Algorithm name or parameter is not recognized
    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Strength parameter is below the configured minimum
    #[error("Weak key parameter for {algorithm}: {bits} bits, minimum is {minimum}")]
    WeakParameter {
        /// Algorithm family
        algorithm: String,
        /// Requested strength in bits
        bits: u32,
        /// Configured minimum in bits
        minimum: u32,
    },

    /// Underlying generator failed
    #[error("Key generation failed: {0}")]
    Generation(String),

    /// Key bytes could not be decoded
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// Certificate issuance errors
#[derive(Debug, Error)]
pub enum IssueError {
    /// Malformed subject, extensions or validity window
    #[error("Invalid certificate request: {0}")]
    InvalidRequest(String),

    /// Issuer certificate is not valid at issuance time
    #[error("Issuer '{issuer}' is not valid at issuance time")]
    ExpiredIssuer {
        /// Issuer subject
        issuer: String,
    },

    /// Signing key does not match the issuer or the signer rejected it
    #[error("Signing failed: {0}")]
    SigningFailure(String),
}

/// Certificate store and encoding errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No bundle under this alias
    #[error("Certificate not found: {0}")]
    NotFound(String),

    /// Alias contains characters outside `[A-Za-z0-9._-]` or is too long
    #[error("Invalid alias: {0}")]
    InvalidAlias(String),

    /// Bundle export requested without a passphrase
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    /// Wrong passphrase or integrity check failure
    #[error("Decryption failed: {0}")]
    DecryptionFailure(String),

    /// Input is not a well-formed certificate or archive
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    /// Bundle has no private key where one is required
    #[error("Bundle has no private key: {0}")]
    MissingPrivateKey(String),

    /// Backing storage failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Revocation lookup errors; all of them are transient from the caller's view
#[derive(Debug, Error)]
pub enum RevocationError {
    /// Lookup exceeded its deadline
    #[error("Revocation lookup timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Network failure reaching the responder
    #[error("Network error during revocation lookup: {0}")]
    Network(String),

    /// Responder answered with data we could not parse
    #[error("Malformed revocation data: {0}")]
    Malformed(String),

    /// Certificate carries no distribution point to consult
    #[error("No revocation source for certificate: {0}")]
    NoSource(String),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// JSON did not match the configuration schema
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is outside its allowed range
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers to decide on retries and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request or encoding; never retried
    Input,
    /// Lookup timeout or network failure; retried with backoff
    TransientIo,
    /// Signature, signing or decryption failure; fatal for the operation
    Crypto,
    /// Requested entity does not exist
    NotFound,
    /// Local storage failure
    Storage,
}

/// Unified error for the crate
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation error
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Issuance error
    #[error(transparent)]
    Issue(#[from] IssueError),

    /// Store or encoding error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Revocation lookup error
    #[error(transparent)]
    Revocation(#[from] RevocationError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// TLS configuration could not be assembled
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl PkiError {
    /// Classify the error for retry and reporting decisions
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PkiError::Key(KeyError::Generation(_)) => ErrorKind::Crypto,
            PkiError::Key(_) => ErrorKind::Input,
            PkiError::Issue(IssueError::SigningFailure(_)) => ErrorKind::Crypto,
            PkiError::Issue(_) => ErrorKind::Input,
            PkiError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            PkiError::Store(StoreError::DecryptionFailure(_)) => ErrorKind::Crypto,
            PkiError::Store(StoreError::Io(_)) => ErrorKind::Storage,
            PkiError::Store(_) => ErrorKind::Input,
            PkiError::Revocation(_) => ErrorKind::TransientIo,
            PkiError::Config(_) | PkiError::Tls(_) => ErrorKind::Input,
        }
    }
}

impl From<rustls::Error> for PkiError {
    fn from(err: rustls::Error) -> Self {
        PkiError::Tls(err.to_string())
    }
}

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, PkiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PkiError::from(StoreError::EmptyPassphrase).kind(),
            ErrorKind::Input
        );
        assert_eq!(
            PkiError::from(StoreError::DecryptionFailure("mac".into())).kind(),
            ErrorKind::Crypto
        );
        assert_eq!(
            PkiError::from(RevocationError::Network("reset".into())).kind(),
            ErrorKind::TransientIo
        );
        assert_eq!(
            PkiError::from(StoreError::NotFound("device".into())).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_weak_parameter_message() {
        let err = KeyError::WeakParameter {
            algorithm: "RSA".into(),
            bits: 1024,
            minimum: 2048,
        };
        assert_eq!(
            err.to_string(),
            "Weak key parameter for RSA: 1024 bits, minimum is 2048"
        );
    }
}
