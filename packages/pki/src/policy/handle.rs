//! Shared handle to the active policy

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::TrustPolicy;
use crate::certificate::Certificate;

/// Lock-free cell holding the active [`TrustPolicy`]
///
/// Validations load the policy once and keep that snapshot for the whole
/// call. Anchors can be appended during a session; a reload replaces the
/// policy wholesale.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    current: Arc<ArcSwap<TrustPolicy>>,
}

impl PolicyHandle {
    /// Publish `policy`
    #[must_use]
    pub fn new(policy: TrustPolicy) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(policy)),
        }
    }

    /// Snapshot of the active policy
    #[must_use]
    pub fn load(&self) -> Arc<TrustPolicy> {
        self.current.load_full()
    }

    /// Replace the active policy
    pub fn reload(&self, policy: TrustPolicy) {
        tracing::info!(
            "Reloaded trust policy with {} anchors",
            policy.anchors().len()
        );
        self.current.store(Arc::new(policy));
    }

    /// Add an anchor to the active policy
    pub fn append_anchor(&self, anchor: Certificate) {
        let subject = anchor.subject().to_string();
        self.current.rcu(|policy| TrustPolicy::clone(policy).with_anchor(anchor.clone()));
        tracing::info!("Appended trust anchor '{}'", subject);
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::new(TrustPolicy::default())
    }
}
