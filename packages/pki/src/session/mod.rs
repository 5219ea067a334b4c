//! Handshake-time peer authentication
//!
//! [`SecureSessionAuthenticator`] turns a presented certificate chain into an
//! accept/reject decision under the active [`TrustPolicy`]. Transports use it
//! either as a plain function value ([`SecureSessionAuthenticator::handshake_hook`])
//! or through the `rustls` verifier and configurations in this module.

mod tls;
mod verifier;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use tls::{client_config, server_config};
pub use verifier::PeerVerifier;

use crate::certificate::Certificate;
use crate::error::StoreError;
use crate::policy::{PolicyHandle, TrustPolicy};
use crate::validator::{ChainValidationResult, ChainValidator};

/// Decision returned to the transport for one handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeDecision {
    /// Peer is trusted
    Accept {
        /// Human-readable reason
        reason: String,
    },
    /// Peer is rejected
    Reject {
        /// Human-readable reason
        reason: String,
    },
}

impl HandshakeDecision {
    /// Whether the peer was accepted
    #[must_use]
    pub fn is_accept(&self) -> bool {
        matches!(self, HandshakeDecision::Accept { .. })
    }

    /// Reason attached to the decision
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            HandshakeDecision::Accept { reason } | HandshakeDecision::Reject { reason } => reason,
        }
    }
}

impl fmt::Display for HandshakeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeDecision::Accept { reason } => write!(f, "accept: {reason}"),
            HandshakeDecision::Reject { reason } => write!(f, "reject: {reason}"),
        }
    }
}

/// Synchronous handshake callback handed to a transport:
/// `(presented_leaf_der, presented_chain_der) -> decision`
pub type HandshakeHook = Arc<dyn Fn(&[u8], &[Vec<u8>]) -> HandshakeDecision + Send + Sync>;

/// Peer chain decoded from the wire
struct Presented {
    leaf: Certificate,
    intermediates: Vec<Certificate>,
}

/// Validates presented peer chains against the active policy
#[derive(Debug, Clone)]
pub struct SecureSessionAuthenticator {
    policy: PolicyHandle,
    validator: ChainValidator,
}

impl SecureSessionAuthenticator {
    /// Authenticator reading the policy from `policy` on every decision
    #[must_use]
    pub fn new(policy: PolicyHandle, validator: ChainValidator) -> Self {
        Self { policy, validator }
    }

    /// Handle to the active policy; reloads take effect on the next handshake
    #[must_use]
    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Validator in use
    #[must_use]
    pub fn validator(&self) -> &ChainValidator {
        &self.validator
    }

    /// Decide on a presented chain, performing revocation lookups if the
    /// policy asks for them
    pub async fn authenticate(
        &self,
        leaf_der: &[u8],
        chain_der: &[Vec<u8>],
        expected_identity: Option<&str>,
    ) -> HandshakeDecision {
        let presented = match decode(leaf_der, chain_der.iter().map(Vec::as_slice)) {
            Ok(presented) => presented,
            Err(e) => return reject_undecodable(&e),
        };
        let policy = self.policy.load();
        let result = self
            .validator
            .validate(
                &presented.leaf,
                &presented.intermediates,
                &policy,
                Utc::now(),
                expected_identity,
            )
            .await;
        conclude(&presented.leaf, &result)
    }

    /// Decide without I/O, using only cached revocation answers
    #[must_use]
    pub fn decide(
        &self,
        leaf_der: &[u8],
        chain_der: &[Vec<u8>],
        expected_identity: Option<&str>,
    ) -> HandshakeDecision {
        self.decide_at(
            leaf_der,
            chain_der.iter().map(Vec::as_slice),
            expected_identity,
            Utc::now(),
        )
    }

    /// Look up revocation status ahead of a handshake so that [`Self::decide`]
    /// finds it cached
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncoding` if a presented certificate does not parse
    pub async fn prefetch(&self, leaf_der: &[u8], chain_der: &[Vec<u8>]) -> Result<usize, StoreError> {
        let presented = decode(leaf_der, chain_der.iter().map(Vec::as_slice))?;
        let policy = self.policy.load();
        Ok(self
            .validator
            .prefetch_revocation(&presented.leaf, &presented.intermediates, &policy)
            .await)
    }

    /// Function value for transports that take a plain callback
    ///
    /// Each call reads the current policy and decides independently; the hook
    /// holds no mutable state.
    #[must_use]
    pub fn handshake_hook(&self, expected_identity: Option<String>) -> HandshakeHook {
        let authenticator = self.clone();
        Arc::new(move |leaf_der: &[u8], chain_der: &[Vec<u8>]| {
            authenticator.decide(leaf_der, chain_der, expected_identity.as_deref())
        })
    }

    pub(crate) fn decide_at<'a>(
        &self,
        leaf_der: &[u8],
        chain_der: impl IntoIterator<Item = &'a [u8]>,
        expected_identity: Option<&str>,
        reference_time: DateTime<Utc>,
    ) -> HandshakeDecision {
        let presented = match decode(leaf_der, chain_der) {
            Ok(presented) => presented,
            Err(e) => return reject_undecodable(&e),
        };
        let policy: Arc<TrustPolicy> = self.policy.load();
        let result = self.validator.validate_cached(
            &presented.leaf,
            &presented.intermediates,
            &policy,
            reference_time,
            expected_identity,
        );
        conclude(&presented.leaf, &result)
    }
}

fn decode<'a>(
    leaf_der: &[u8],
    chain_der: impl IntoIterator<Item = &'a [u8]>,
) -> Result<Presented, StoreError> {
    let leaf = Certificate::from_der(leaf_der)?;
    let intermediates = chain_der
        .into_iter()
        .map(Certificate::from_der)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Presented {
        leaf,
        intermediates,
    })
}

fn reject_undecodable(err: &StoreError) -> HandshakeDecision {
    tracing::error!("Rejecting peer: presented certificate could not be decoded: {}", err);
    HandshakeDecision::Reject {
        reason: format!("Presented certificate could not be decoded: {err}"),
    }
}

fn conclude(leaf: &Certificate, result: &ChainValidationResult) -> HandshakeDecision {
    if result.is_trusted() {
        for warning in result.warnings() {
            tracing::warn!("Accepted peer '{}' with warning: {}", leaf.subject(), warning);
        }
        tracing::info!("Accepted peer '{}'", leaf.subject());
        HandshakeDecision::Accept {
            reason: result.summary(),
        }
    } else {
        let reason = result.summary();
        tracing::error!("Rejecting peer '{}': {}", leaf.subject(), reason);
        HandshakeDecision::Reject { reason }
    }
}
