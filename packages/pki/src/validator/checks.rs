//! Per-certificate checks applied to a built chain

use chrono::{DateTime, Utc};

use super::result::PolicyViolation;
use crate::certificate::Certificate;

/// Validity window check; relaxed to a warning when expired certificates are allowed
pub(crate) fn check_validity(
    chain: &[Certificate],
    at: DateTime<Utc>,
    allow_expired: bool,
    violations: &mut Vec<PolicyViolation>,
    warnings: &mut Vec<String>,
) {
    for certificate in chain {
        if certificate.is_valid_at(at) {
            continue;
        }
        let violation = PolicyViolation::TimeInvalid {
            subject: certificate.subject().to_string(),
            not_before: certificate.not_before(),
            not_after: certificate.not_after(),
        };
        if allow_expired {
            warnings.push(format!("Ignored by policy: {violation}"));
        } else {
            violations.push(violation);
        }
    }
}

/// Every certificate above the leaf must be a CA allowed to sign
/// certificates, and must not have more CA certificates below it than its
/// path length permits
pub(crate) fn check_issuers(chain: &[Certificate], violations: &mut Vec<PolicyViolation>) {
    for (depth, issuer) in chain.iter().enumerate().skip(1) {
        let invalid = |reason: String| PolicyViolation::InvalidBasicConstraints {
            subject: issuer.subject().to_string(),
            reason,
        };

        let Some(constraints) = issuer.basic_constraints().filter(|bc| bc.ca) else {
            violations.push(invalid("not a CA certificate".to_string()));
            continue;
        };

        if let Some(usage) = issuer.key_usage()
            && !usage.key_cert_sign
        {
            violations.push(invalid("key usage lacks keyCertSign".to_string()));
        }

        let ca_below = depth - 1;
        if let Some(path_len) = constraints.path_len
            && ca_below > path_len as usize
        {
            violations.push(invalid(format!(
                "path length {path_len} exceeded by {ca_below} CA certificate(s) below"
            )));
        }
    }
}
