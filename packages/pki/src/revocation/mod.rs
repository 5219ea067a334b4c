//! Revocation checking
//!
//! - `RevocationChecker`: capability answering good / revoked / unknown
//! - `crl`: CRL distribution point checker over HTTP with a CRL cache
//! - `static_list`: in-process deny list
//! - `cache`: pre-validation status cache read during TLS handshakes
//! - `lookup`: timeout and retry wrapper applied to every lookup

mod cache;
mod crl;
pub(crate) mod lookup;
mod static_list;

use async_trait::async_trait;

pub use cache::RevocationCache;
pub use crl::CrlRevocationChecker;
pub use static_list::StaticRevocationList;

use crate::certificate::Certificate;
use crate::error::RevocationError;

/// Answer of a revocation source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    /// Not revoked
    Good,
    /// Revoked before expiry
    Revoked,
    /// The source has no answer for this certificate
    Unknown,
}

/// External revocation source (a CRL endpoint or a local list)
///
/// Errors are lookup failures; the validator retries them and then applies
/// the policy's soft/hard-fail mode.
#[async_trait]
pub trait RevocationChecker: Send + Sync {
    /// Look up the status of `certificate`, issued by `issuer`
    ///
    /// Sources that publish signed statements (CRLs) must only accept
    /// statements from `issuer`. A self-signed certificate is its own issuer.
    async fn check(
        &self,
        certificate: &Certificate,
        issuer: &Certificate,
    ) -> Result<RevocationStatus, RevocationError>;
}
