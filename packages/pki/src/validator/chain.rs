//! Issuer path construction

use std::collections::HashSet;

use super::result::PolicyViolation;
use crate::certificate::{Certificate, Fingerprint};
use crate::policy::TrustPolicy;

/// Result of walking issuers from the leaf
#[derive(Debug)]
pub(crate) struct BuiltChain {
    pub(crate) certificates: Vec<Certificate>,
    pub(crate) anchored: bool,
    pub(crate) violations: Vec<PolicyViolation>,
}

impl BuiltChain {
    /// Certificates that are not the terminating anchor
    pub(crate) fn non_anchor(&self) -> &[Certificate] {
        if self.anchored {
            &self.certificates[..self.certificates.len().saturating_sub(1)]
        } else {
            &self.certificates
        }
    }

    /// Non-anchor certificates paired with the certificate that issued them
    ///
    /// The top of an unanchored chain is left out unless it is self-signed,
    /// since nothing in the chain issued it.
    pub(crate) fn with_issuers(&self) -> Vec<(Certificate, Certificate)> {
        self.non_anchor()
            .iter()
            .enumerate()
            .filter_map(|(i, certificate)| {
                let issuer = match self.certificates.get(i + 1) {
                    Some(issuer) => issuer,
                    None if certificate.is_self_signed() => certificate,
                    None => return None,
                };
                Some((certificate.clone(), issuer.clone()))
            })
            .collect()
    }
}

/// Walk from `leaf` to an anchor, preferring anchors over supplied
/// intermediates and earlier intermediates over later ones
///
/// The walk stops at the first anchor, at a self-signed certificate, or when
/// no candidate issuer verifies the current certificate's signature.
pub(crate) fn build_chain(
    leaf: &Certificate,
    intermediates: &[Certificate],
    policy: &TrustPolicy,
) -> BuiltChain {
    let mut chain = BuiltChain {
        certificates: vec![leaf.clone()],
        anchored: policy.is_anchor(leaf),
        violations: Vec::new(),
    };
    let mut seen: HashSet<Fingerprint> = HashSet::from([leaf.fingerprint()]);
    let max_depth = policy.max_chain_depth();

    let mut current = leaf.clone();
    while !chain.anchored && !current.is_self_signed() {
        let issuer_name = current.issuer_raw();
        let mut name_matched = false;
        let selected = policy
            .anchors()
            .by_subject(issuer_name)
            .chain(intermediates.iter().filter(|c| c.subject_raw() == issuer_name))
            .find(|candidate| {
                name_matched = true;
                current.is_signed_by(candidate)
            })
            .cloned();

        let Some(issuer) = selected else {
            if name_matched {
                chain.violations.push(PolicyViolation::SignatureInvalid {
                    subject: current.subject().to_string(),
                    issuer: current.issuer().to_string(),
                });
            }
            break;
        };

        if !seen.insert(issuer.fingerprint()) {
            chain.violations.push(PolicyViolation::CycleDetected {
                subject: issuer.subject().to_string(),
            });
            break;
        }
        if chain.certificates.len() >= max_depth {
            chain.violations.push(PolicyViolation::ChainTooLong { max_depth });
            break;
        }

        chain.anchored = policy.is_anchor(&issuer);
        chain.certificates.push(issuer.clone());
        current = issuer;
    }

    tracing::debug!(
        "Built chain of {} certificate(s) for '{}', anchored: {}",
        chain.certificates.len(),
        leaf.subject(),
        chain.anchored
    );
    chain
}
