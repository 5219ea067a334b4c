//! Bounded revocation lookups

use super::{RevocationChecker, RevocationStatus};
use crate::certificate::Certificate;
use crate::config::EngineConfig;
use crate::error::RevocationError;

/// Run one lookup with the configured deadline, retrying transient failures
pub(crate) async fn lookup_with_retry(
    checker: &dyn RevocationChecker,
    certificate: &Certificate,
    issuer: &Certificate,
    config: &EngineConfig,
) -> Result<RevocationStatus, RevocationError> {
    let mut delays = config.backoff_schedule();
    loop {
        let result = match tokio::time::timeout(
            config.revocation_timeout,
            checker.check(certificate, issuer),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RevocationError::Timeout(config.revocation_timeout)),
        };

        let err = match result {
            Ok(status) => return Ok(status),
            Err(e @ (RevocationError::Timeout(_) | RevocationError::Network(_))) => e,
            Err(e) => return Err(e),
        };

        match delays.next() {
            Some(delay) => {
                tracing::warn!(
                    "Revocation lookup for '{}' failed ({}), retrying in {:?}",
                    certificate.subject(),
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            None => return Err(err),
        }
    }
}
