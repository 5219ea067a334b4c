//! Validation outcome types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::certificate::Certificate;

/// Whether the chain is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustOutcome {
    /// Anchored and free of violations
    Trusted,
    /// Not anchored or at least one violation
    Untrusted,
}

/// A reason the chain is not trusted
///
/// These are data, not errors: they are reported in a
/// [`ChainValidationResult`] so callers decide how to react.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    /// The chain does not end at a trust anchor
    #[error("No path to a trusted anchor")]
    NoTrustedAnchor,

    /// The chain would exceed the policy's depth limit
    #[error("Chain exceeds maximum depth of {max_depth}")]
    ChainTooLong {
        /// Policy limit
        max_depth: usize,
    },

    /// A certificate appeared twice while walking issuers
    #[error("Issuer loop detected at '{subject}'")]
    CycleDetected {
        /// Certificate seen twice
        subject: String,
    },

    /// An issuer with the right name did not verify the signature
    #[error("Signature of '{subject}' does not verify under any issuer named '{issuer}'")]
    SignatureInvalid {
        /// Certificate whose signature failed
        subject: String,
        /// Issuer name it claims
        issuer: String,
    },

    /// Outside the validity window at the reference time
    #[error("'{subject}' is not valid at reference time (valid {not_before} to {not_after})")]
    TimeInvalid {
        /// Offending certificate
        subject: String,
        /// Window start
        not_before: DateTime<Utc>,
        /// Window end
        not_after: DateTime<Utc>,
    },

    /// A certificate acting as issuer is not allowed to
    #[error("'{subject}' may not act as issuer: {reason}")]
    InvalidBasicConstraints {
        /// Offending issuer
        subject: String,
        /// Which constraint failed
        reason: String,
    },

    /// The leaf does not name the expected host
    #[error("Certificate does not match expected identity '{expected}'")]
    HostnameMismatch {
        /// Expected identity
        expected: String,
    },

    /// A revocation source reported the certificate revoked
    #[error("'{subject}' is revoked")]
    Revoked {
        /// Revoked certificate
        subject: String,
    },

    /// Revocation status could not be established under hard-fail
    #[error("Revocation status of '{subject}' unknown: {reason}")]
    RevocationUnknown {
        /// Certificate in question
        subject: String,
        /// Lookup failure
        reason: String,
    },
}

/// Fieldless tag of a [`PolicyViolation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// See [`PolicyViolation::NoTrustedAnchor`]
    NoTrustedAnchor,
    /// See [`PolicyViolation::ChainTooLong`]
    ChainTooLong,
    /// See [`PolicyViolation::CycleDetected`]
    CycleDetected,
    /// See [`PolicyViolation::SignatureInvalid`]
    SignatureInvalid,
    /// See [`PolicyViolation::TimeInvalid`]
    TimeInvalid,
    /// See [`PolicyViolation::InvalidBasicConstraints`]
    InvalidBasicConstraints,
    /// See [`PolicyViolation::HostnameMismatch`]
    HostnameMismatch,
    /// See [`PolicyViolation::Revoked`]
    Revoked,
    /// See [`PolicyViolation::RevocationUnknown`]
    RevocationUnknown,
}

impl PolicyViolation {
    /// Tag for matching without caring about details
    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        match self {
            PolicyViolation::NoTrustedAnchor => ViolationKind::NoTrustedAnchor,
            PolicyViolation::ChainTooLong { .. } => ViolationKind::ChainTooLong,
            PolicyViolation::CycleDetected { .. } => ViolationKind::CycleDetected,
            PolicyViolation::SignatureInvalid { .. } => ViolationKind::SignatureInvalid,
            PolicyViolation::TimeInvalid { .. } => ViolationKind::TimeInvalid,
            PolicyViolation::InvalidBasicConstraints { .. } => {
                ViolationKind::InvalidBasicConstraints
            }
            PolicyViolation::HostnameMismatch { .. } => ViolationKind::HostnameMismatch,
            PolicyViolation::Revoked { .. } => ViolationKind::Revoked,
            PolicyViolation::RevocationUnknown { .. } => ViolationKind::RevocationUnknown,
        }
    }
}

/// Outcome of one validation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainValidationResult {
    pub(crate) outcome: TrustOutcome,
    pub(crate) chain: Vec<Certificate>,
    pub(crate) violations: Vec<PolicyViolation>,
    pub(crate) warnings: Vec<String>,
}

impl ChainValidationResult {
    /// Trusted or untrusted
    #[must_use]
    pub fn outcome(&self) -> TrustOutcome {
        self.outcome
    }

    /// Shorthand for `outcome() == Trusted`
    #[must_use]
    pub fn is_trusted(&self) -> bool {
        self.outcome == TrustOutcome::Trusted
    }

    /// Chain as built, leaf first
    #[must_use]
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Violations in the order found
    #[must_use]
    pub fn violations(&self) -> &[PolicyViolation] {
        &self.violations
    }

    /// Whether a violation of `kind` was recorded
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind() == kind)
    }

    /// Notes that did not affect the outcome (soft-fail lookups, relaxed policy)
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// One-line description suitable for a handshake rejection
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_trusted() {
            return match self.chain.last() {
                Some(anchor) => format!("Trusted via '{}'", anchor.subject()),
                None => "Trusted".to_string(),
            };
        }
        self.violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}
