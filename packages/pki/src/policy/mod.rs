//! Trust policy
//!
//! A [`TrustPolicy`] is an immutable value; every `with_*` call returns a new
//! policy. [`PolicyHandle`] publishes the active policy to concurrent readers.

mod anchors;
mod handle;

pub use anchors::TrustAnchorSet;
pub use handle::PolicyHandle;

use crate::certificate::Certificate;

/// Default maximum number of certificates in a chain, leaf and anchor included
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

/// How the expected hostname is compared with the leaf's names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostnameMode {
    /// Exact, case-insensitive match
    #[default]
    Strict,
    /// Additionally accept a `*` leftmost label covering exactly one label
    WildcardPermissive,
}

/// What to do about revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevocationMode {
    /// No revocation lookups
    #[default]
    None,
    /// Lookup failures become warnings
    SoftFail,
    /// Lookup failures reject the chain
    HardFail,
}

/// Immutable validation policy
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    anchors: TrustAnchorSet,
    max_chain_depth: usize,
    allow_expired: bool,
    allow_self_signed_leaf: bool,
    hostname_mode: HostnameMode,
    revocation_mode: RevocationMode,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            anchors: TrustAnchorSet::default(),
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            allow_expired: false,
            allow_self_signed_leaf: false,
            hostname_mode: HostnameMode::Strict,
            revocation_mode: RevocationMode::None,
        }
    }
}

impl TrustPolicy {
    /// Default-deny policy trusting `anchors`
    #[must_use]
    pub fn new(anchors: TrustAnchorSet) -> Self {
        Self {
            anchors,
            ..Self::default()
        }
    }

    /// Replace the anchor set
    #[must_use]
    pub fn with_anchors(self, anchors: TrustAnchorSet) -> Self {
        Self { anchors, ..self }
    }

    /// Add one anchor
    #[must_use]
    pub fn with_anchor(self, anchor: Certificate) -> Self {
        Self {
            anchors: self.anchors.with(anchor),
            ..self
        }
    }

    /// Limit chain length, leaf and anchor included
    #[must_use]
    pub fn with_max_chain_depth(self, max_chain_depth: usize) -> Self {
        Self {
            max_chain_depth: max_chain_depth.max(1),
            ..self
        }
    }

    /// Downgrade validity window failures to warnings
    #[must_use]
    pub fn with_allow_expired(self, allow_expired: bool) -> Self {
        Self {
            allow_expired,
            ..self
        }
    }

    /// Accept a self-signed leaf that is not an anchor; every use is logged
    #[must_use]
    pub fn with_allow_self_signed_leaf(self, allow_self_signed_leaf: bool) -> Self {
        if allow_self_signed_leaf {
            tracing::warn!("Trust policy allows unanchored self-signed leaf certificates");
        }
        Self {
            allow_self_signed_leaf,
            ..self
        }
    }

    /// Hostname matching mode
    #[must_use]
    pub fn with_hostname_mode(self, hostname_mode: HostnameMode) -> Self {
        Self {
            hostname_mode,
            ..self
        }
    }

    /// Revocation mode
    #[must_use]
    pub fn with_revocation_mode(self, revocation_mode: RevocationMode) -> Self {
        Self {
            revocation_mode,
            ..self
        }
    }

    /// Whether `certificate` is a trust anchor
    #[must_use]
    pub fn is_anchor(&self, certificate: &Certificate) -> bool {
        self.anchors.contains(certificate)
    }

    /// Trust anchors
    #[must_use]
    pub fn anchors(&self) -> &TrustAnchorSet {
        &self.anchors
    }

    /// Maximum chain length
    #[must_use]
    pub fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    /// Whether validity window failures are tolerated
    #[must_use]
    pub fn allow_expired(&self) -> bool {
        self.allow_expired
    }

    /// Whether an unanchored self-signed leaf is tolerated
    #[must_use]
    pub fn allow_self_signed_leaf(&self) -> bool {
        self.allow_self_signed_leaf
    }

    /// Hostname matching mode
    #[must_use]
    pub fn hostname_mode(&self) -> HostnameMode {
        self.hostname_mode
    }

    /// Revocation mode
    #[must_use]
    pub fn revocation_mode(&self) -> RevocationMode {
        self.revocation_mode
    }
}
