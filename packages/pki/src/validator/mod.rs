//! Chain validation
//!
//! [`ChainValidator`] builds a path from a leaf through supplied
//! intermediates to a trust anchor and evaluates it against a
//! [`TrustPolicy`]. Violations are collected, not short-circuited, so a
//! rejected chain reports every reason it was rejected.
//!
//! Revocation is looked up in [`ChainValidator::validate`]. The synchronous
//! [`ChainValidator::validate_cached`] used inside TLS handshakes reads only
//! answers stored by an earlier lookup or [`ChainValidator::prefetch_revocation`].

mod chain;
mod checks;
pub mod hostname;
mod result;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use hostname::matches_hostname;
pub use result::{ChainValidationResult, PolicyViolation, TrustOutcome, ViolationKind};

use crate::certificate::Certificate;
use crate::config::EngineConfig;
use crate::policy::{RevocationMode, TrustPolicy};
use crate::revocation::lookup::lookup_with_retry;
use crate::revocation::{RevocationCache, RevocationChecker, RevocationStatus};
use chain::{BuiltChain, build_chain};

/// Outcome of one revocation lookup as seen by the validator
enum Lookup {
    Answered(RevocationStatus),
    Failed(String),
}

/// Everything except revocation, computed once per validation
struct Assessment {
    chain: BuiltChain,
    root_accepted: bool,
    violations: Vec<PolicyViolation>,
    warnings: Vec<String>,
}

impl Assessment {
    fn revocation_targets(&self, policy: &TrustPolicy) -> Vec<(Certificate, Certificate)> {
        if policy.revocation_mode() == RevocationMode::None || !self.root_accepted {
            return Vec::new();
        }
        self.chain.with_issuers()
    }

    fn record(&mut self, certificate: &Certificate, lookup: Lookup, mode: RevocationMode) {
        let reason = match lookup {
            Lookup::Answered(RevocationStatus::Good) => return,
            Lookup::Answered(RevocationStatus::Revoked) => {
                tracing::warn!(
                    "Certificate '{}' (serial {}) is revoked",
                    certificate.subject(),
                    certificate.serial_hex()
                );
                self.violations.push(PolicyViolation::Revoked {
                    subject: certificate.subject().to_string(),
                });
                return;
            }
            Lookup::Answered(RevocationStatus::Unknown) => {
                "revocation source has no answer".to_string()
            }
            Lookup::Failed(reason) => reason,
        };

        match mode {
            RevocationMode::HardFail => {
                self.violations.push(PolicyViolation::RevocationUnknown {
                    subject: certificate.subject().to_string(),
                    reason,
                });
            }
            RevocationMode::SoftFail => {
                tracing::warn!(
                    "Revocation status of '{}' unknown, continuing: {}",
                    certificate.subject(),
                    reason
                );
                self.warnings.push(format!(
                    "Revocation status of '{}' unknown: {reason}",
                    certificate.subject()
                ));
            }
            RevocationMode::None => {}
        }
    }

    fn finish(self) -> ChainValidationResult {
        let outcome = if self.root_accepted && self.violations.is_empty() {
            TrustOutcome::Trusted
        } else {
            TrustOutcome::Untrusted
        };
        ChainValidationResult {
            outcome,
            chain: self.chain.certificates,
            violations: self.violations,
            warnings: self.warnings,
        }
    }
}

/// Validates certificate chains against a trust policy
#[derive(Clone)]
pub struct ChainValidator {
    config: Arc<EngineConfig>,
    checker: Option<Arc<dyn RevocationChecker>>,
    cache: RevocationCache,
}

impl fmt::Debug for ChainValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainValidator")
            .field("config", &self.config)
            .field("has_revocation_checker", &self.checker.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl ChainValidator {
    /// Validator without a revocation source
    ///
    /// Policies that ask for revocation checks then see every lookup fail.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let cache = RevocationCache::new(config.crl_cache_ttl);
        Self {
            config: Arc::new(config),
            checker: None,
            cache,
        }
    }

    /// Use `checker` for revocation lookups
    #[must_use]
    pub fn with_revocation_checker(self, checker: Arc<dyn RevocationChecker>) -> Self {
        Self {
            checker: Some(checker),
            ..self
        }
    }

    /// Answers stored for handshake-time validation
    #[must_use]
    pub fn revocation_cache(&self) -> &RevocationCache {
        &self.cache
    }

    /// Validate `leaf` at `reference_time`, looking up revocation status as
    /// the policy requires
    ///
    /// `intermediates` may be in any order and may contain unrelated
    /// certificates. When `expected_hostname` is given the leaf must name it.
    pub async fn validate(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
        policy: &TrustPolicy,
        reference_time: DateTime<Utc>,
        expected_hostname: Option<&str>,
    ) -> ChainValidationResult {
        let mut assessment =
            Self::assess(leaf, intermediates, policy, reference_time, expected_hostname);
        for (certificate, issuer) in assessment.revocation_targets(policy) {
            let lookup = self.lookup(&certificate, &issuer).await;
            assessment.record(&certificate, lookup, policy.revocation_mode());
        }
        Self::log_result(leaf, assessment.finish())
    }

    /// Validate without any I/O; revocation answers come from the cache only
    ///
    /// A certificate with no fresh cached answer counts as a failed lookup.
    #[must_use]
    pub fn validate_cached(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
        policy: &TrustPolicy,
        reference_time: DateTime<Utc>,
        expected_hostname: Option<&str>,
    ) -> ChainValidationResult {
        let mut assessment =
            Self::assess(leaf, intermediates, policy, reference_time, expected_hostname);
        for (certificate, _) in assessment.revocation_targets(policy) {
            let lookup = match self.cache.get(&certificate.fingerprint()) {
                Some(status) => Lookup::Answered(status),
                None => Lookup::Failed("revocation status not prefetched".to_string()),
            };
            assessment.record(&certificate, lookup, policy.revocation_mode());
        }
        Self::log_result(leaf, assessment.finish())
    }

    /// Look up and cache revocation status for every non-anchor certificate
    /// of the chain `leaf` builds to
    ///
    /// Returns how many certificates now have a cached answer.
    pub async fn prefetch_revocation(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
        policy: &TrustPolicy,
    ) -> usize {
        let chain = build_chain(leaf, intermediates, policy);
        let pairs = chain.with_issuers();
        let lookups = pairs
            .iter()
            .map(|(certificate, issuer)| self.lookup(certificate, issuer));
        let answered = futures::future::join_all(lookups)
            .await
            .into_iter()
            .filter(|lookup| {
                matches!(
                    lookup,
                    Lookup::Answered(RevocationStatus::Good | RevocationStatus::Revoked)
                )
            })
            .count();
        tracing::debug!(
            "Prefetched revocation status for {}/{} certificate(s) of '{}'",
            answered,
            chain.non_anchor().len(),
            leaf.subject()
        );
        answered
    }

    async fn lookup(&self, certificate: &Certificate, issuer: &Certificate) -> Lookup {
        let fingerprint = certificate.fingerprint();
        if let Some(status) = self.cache.get(&fingerprint) {
            return Lookup::Answered(status);
        }
        let Some(checker) = &self.checker else {
            return Lookup::Failed("no revocation source configured".to_string());
        };
        match lookup_with_retry(checker.as_ref(), certificate, issuer, &self.config).await {
            Ok(status) => {
                if status != RevocationStatus::Unknown {
                    self.cache.insert(fingerprint, status);
                }
                Lookup::Answered(status)
            }
            Err(e) => Lookup::Failed(e.to_string()),
        }
    }

    fn assess(
        leaf: &Certificate,
        intermediates: &[Certificate],
        policy: &TrustPolicy,
        reference_time: DateTime<Utc>,
        expected_hostname: Option<&str>,
    ) -> Assessment {
        let chain = build_chain(leaf, intermediates, policy);
        let mut violations = chain.violations.clone();
        let mut warnings = Vec::new();

        let self_signed_bypass = !chain.anchored
            && chain.certificates.len() == 1
            && policy.allow_self_signed_leaf()
            && leaf.is_self_signed();
        if self_signed_bypass {
            tracing::warn!(
                "Accepting self-signed leaf '{}' without a trust anchor",
                leaf.subject()
            );
            warnings.push(format!(
                "Self-signed leaf '{}' accepted by policy",
                leaf.subject()
            ));
        } else if !chain.anchored {
            violations.push(PolicyViolation::NoTrustedAnchor);
        }

        checks::check_validity(
            &chain.certificates,
            reference_time,
            policy.allow_expired(),
            &mut violations,
            &mut warnings,
        );
        checks::check_issuers(&chain.certificates, &mut violations);

        if let Some(expected) = expected_hostname
            && !matches_hostname(leaf, expected, policy.hostname_mode())
        {
            violations.push(PolicyViolation::HostnameMismatch {
                expected: expected.to_string(),
            });
        }

        Assessment {
            root_accepted: chain.anchored || self_signed_bypass,
            chain,
            violations,
            warnings,
        }
    }

    fn log_result(leaf: &Certificate, result: ChainValidationResult) -> ChainValidationResult {
        if result.is_trusted() {
            tracing::debug!("Chain for '{}' trusted", leaf.subject());
        } else {
            tracing::debug!("Chain for '{}' untrusted: {}", leaf.subject(), result.summary());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::builder::{CertificateBuilder, IssuerRef, RequestBuilder};
    use crate::key_material::{KeyAlgorithm, KeyMaterial, KeyPair};
    use crate::revocation::StaticRevocationList;
    use crate::store::CertificateBundle;

    fn key() -> KeyPair {
        KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation")
    }

    fn copy_key(bundle: &CertificateBundle) -> KeyPair {
        let pkcs8 = bundle
            .private_key()
            .and_then(KeyPair::private_key_pkcs8)
            .expect("bundle holds a key");
        KeyPair::from_pkcs8_der(pkcs8).expect("key re-import")
    }

    struct Pki {
        root: CertificateBundle,
        intermediate: CertificateBundle,
        leaf: CertificateBundle,
    }

    fn pki() -> Pki {
        let builder = CertificateBuilder::new();
        let root = builder
            .issue(RequestBuilder::root_ca("Test Root", key()).build(), IssuerRef::SelfSigned)
            .expect("root");
        let intermediate = builder
            .issue(
                RequestBuilder::intermediate_ca("Test Intermediate", key()).build(),
                IssuerRef::from_bundle(&root).expect("root key"),
            )
            .expect("intermediate");
        let leaf = builder
            .issue(
                RequestBuilder::device("device-01", key()).build(),
                IssuerRef::from_bundle(&intermediate).expect("intermediate key"),
            )
            .expect("leaf");
        Pki {
            root,
            intermediate,
            leaf,
        }
    }

    fn policy(pki: &Pki) -> TrustPolicy {
        TrustPolicy::default().with_anchor(pki.root.certificate().clone())
    }

    #[test]
    fn test_intermediates_order_does_not_matter() {
        let pki = pki();
        let validator = ChainValidator::default();
        let unrelated = CertificateBuilder::new()
            .issue(RequestBuilder::root_ca("Other Root", key()).build(), IssuerRef::SelfSigned)
            .expect("other root");

        let intermediates = vec![
            unrelated.certificate().clone(),
            pki.intermediate.certificate().clone(),
        ];
        let result = validator.validate_cached(
            pki.leaf.certificate(),
            &intermediates,
            &policy(&pki),
            Utc::now(),
            Some("device-01"),
        );
        assert!(result.is_trusted(), "{}", result.summary());
        assert_eq!(result.chain().len(), 3);
        assert_eq!(result.chain()[1], *pki.intermediate.certificate());
        assert_eq!(result.chain()[2], *pki.root.certificate());
    }

    #[test]
    fn test_missing_intermediate_is_untrusted() {
        let pki = pki();
        let result = ChainValidator::default().validate_cached(
            pki.leaf.certificate(),
            &[],
            &policy(&pki),
            Utc::now(),
            None,
        );
        assert!(!result.is_trusted());
        assert!(result.has_violation(ViolationKind::NoTrustedAnchor));
        assert_eq!(result.chain().len(), 1);
    }

    #[test]
    fn test_chain_depth_limit() {
        let pki = pki();
        let result = ChainValidator::default().validate_cached(
            pki.leaf.certificate(),
            &[pki.intermediate.certificate().clone()],
            &policy(&pki).with_max_chain_depth(2),
            Utc::now(),
            None,
        );
        assert!(result.has_violation(ViolationKind::ChainTooLong));
        assert!(result.has_violation(ViolationKind::NoTrustedAnchor));
    }

    #[test]
    fn test_issuer_loop_is_detected() {
        let builder = CertificateBuilder::new();
        let b_root = builder
            .issue(RequestBuilder::root_ca("B", key()).build(), IssuerRef::SelfSigned)
            .expect("B root");
        let a = builder
            .issue(
                RequestBuilder::intermediate_ca("A", key()).ca(None).build(),
                IssuerRef::from_bundle(&b_root).expect("B key"),
            )
            .expect("A");
        let b_cross = builder
            .issue(
                RequestBuilder::intermediate_ca("B", copy_key(&b_root))
                    .ca(None)
                    .valid_for_days(30)
                    .build(),
                IssuerRef::from_bundle(&a).expect("A key"),
            )
            .expect("B cross-signed by A");
        let leaf = builder
            .issue(
                RequestBuilder::device("looped", key()).build(),
                IssuerRef::from_bundle(&a).expect("A key"),
            )
            .expect("leaf");

        let result = ChainValidator::default().validate_cached(
            leaf.certificate(),
            &[a.certificate().clone(), b_cross.certificate().clone()],
            &TrustPolicy::default(),
            Utc::now(),
            None,
        );
        assert!(result.has_violation(ViolationKind::CycleDetected));
        assert!(!result.is_trusted());
    }

    #[test]
    fn test_path_length_counts_cas_below() {
        let pki = pki();
        let chain = vec![
            pki.leaf.certificate().clone(),
            pki.root.certificate().clone(),
            pki.intermediate.certificate().clone(),
            pki.root.certificate().clone(),
        ];
        let mut violations = Vec::new();
        checks::check_issuers(&chain, &mut violations);
        assert_eq!(violations.len(), 1);
        assert!(matches!(
            &violations[0],
            PolicyViolation::InvalidBasicConstraints { subject, .. } if subject.contains("Test Intermediate")
        ));
    }

    #[test]
    fn test_leaf_cannot_act_as_issuer() {
        let pki = pki();
        let chain = vec![
            pki.leaf.certificate().clone(),
            pki.leaf.certificate().clone(),
        ];
        let mut violations = Vec::new();
        checks::check_issuers(&chain, &mut violations);
        assert!(matches!(
            violations.as_slice(),
            [PolicyViolation::InvalidBasicConstraints { .. }]
        ));
    }

    #[test]
    fn test_allowed_expired_becomes_warning() {
        let pki = pki();
        let later = Utc::now() + chrono::Duration::days(400);
        let intermediates = [pki.intermediate.certificate().clone()];

        let strict = ChainValidator::default().validate_cached(
            pki.leaf.certificate(),
            &intermediates,
            &policy(&pki),
            later,
            None,
        );
        assert!(strict.has_violation(ViolationKind::TimeInvalid));

        let relaxed = ChainValidator::default().validate_cached(
            pki.leaf.certificate(),
            &intermediates,
            &policy(&pki).with_allow_expired(true),
            later,
            None,
        );
        assert!(relaxed.is_trusted());
        assert_eq!(relaxed.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_revoked_leaf_is_rejected() {
        let pki = pki();
        let revoked = StaticRevocationList::new().revoke(pki.leaf.certificate());
        let validator = ChainValidator::default().with_revocation_checker(Arc::new(revoked));

        let result = validator
            .validate(
                pki.leaf.certificate(),
                &[pki.intermediate.certificate().clone()],
                &policy(&pki).with_revocation_mode(RevocationMode::SoftFail),
                Utc::now(),
                None,
            )
            .await;
        assert!(result.has_violation(ViolationKind::Revoked));
        assert!(!result.is_trusted());
    }

    #[tokio::test]
    async fn test_soft_and_hard_fail_without_source() {
        let pki = pki();
        let validator = ChainValidator::default();
        let intermediates = [pki.intermediate.certificate().clone()];

        let soft = validator
            .validate(
                pki.leaf.certificate(),
                &intermediates,
                &policy(&pki).with_revocation_mode(RevocationMode::SoftFail),
                Utc::now(),
                None,
            )
            .await;
        assert!(soft.is_trusted());
        assert_eq!(soft.warnings().len(), 2);

        let hard = validator
            .validate(
                pki.leaf.certificate(),
                &intermediates,
                &policy(&pki).with_revocation_mode(RevocationMode::HardFail),
                Utc::now(),
                None,
            )
            .await;
        assert!(!hard.is_trusted());
        assert!(hard.has_violation(ViolationKind::RevocationUnknown));
    }

    #[tokio::test]
    async fn test_cached_validation_needs_prefetch() {
        let pki = pki();
        let validator = ChainValidator::new(EngineConfig {
            crl_cache_ttl: Duration::from_secs(300),
            ..EngineConfig::default()
        })
        .with_revocation_checker(Arc::new(StaticRevocationList::new()));
        let intermediates = [pki.intermediate.certificate().clone()];
        let policy = policy(&pki).with_revocation_mode(RevocationMode::HardFail);

        let before = validator.validate_cached(
            pki.leaf.certificate(),
            &intermediates,
            &policy,
            Utc::now(),
            None,
        );
        assert!(before.has_violation(ViolationKind::RevocationUnknown));

        let answered = validator
            .prefetch_revocation(pki.leaf.certificate(), &intermediates, &policy)
            .await;
        assert_eq!(answered, 2);

        let after = validator.validate_cached(
            pki.leaf.certificate(),
            &intermediates,
            &policy,
            Utc::now(),
            None,
        );
        assert!(after.is_trusted(), "{}", after.summary());
    }
}
