//! CRL checker and CRL cache

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::Client;
use x509_parser::prelude::*;

use super::{RevocationChecker, RevocationStatus};
use crate::certificate::parser::normalize_serial;
use crate::certificate::{Certificate, Fingerprint};
use crate::config::EngineConfig;
use crate::error::RevocationError;

/// CRLs are cached per issuer so one issuer's list never answers for another
type CrlKey = (Fingerprint, String);

#[derive(Debug, Clone)]
struct CrlCacheEntry {
    revoked_serials: HashSet<Vec<u8>>,
    cached_at: SystemTime,
    next_update: Option<SystemTime>,
}

/// Revocation checker that downloads the CRLs named in a certificate
#[derive(Clone, Debug)]
pub struct CrlRevocationChecker {
    client: Client,
    cache: Arc<RwLock<HashMap<CrlKey, CrlCacheEntry>>>,
    ttl: Duration,
    cache_hits: Arc<AtomicUsize>,
    cache_misses: Arc<AtomicUsize>,
}

impl CrlRevocationChecker {
    /// Create a checker using the configured timeout and cache lifetime
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized
    pub fn new(config: &EngineConfig) -> Result<Self, RevocationError> {
        let client = Client::builder()
            .timeout(config.revocation_timeout)
            .user_agent(concat!("cryypt-pki/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RevocationError::Network(format!("Failed to initialize HTTP client: {e}")))?;

        Ok(Self {
            client,
            cache: Arc::new(RwLock::new(HashMap::with_capacity(64))),
            ttl: config.crl_cache_ttl,
            cache_hits: Arc::new(AtomicUsize::new(0)),
            cache_misses: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Cache statistics (hits, misses)
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    /// Load a CRL published by `issuer` into the cache as if downloaded
    /// from `url`
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the document is not a DER or PEM CRL, or if it
    /// is not issued and signed by `issuer`
    pub fn preload(
        &self,
        issuer: &Certificate,
        url: &str,
        crl_bytes: &[u8],
    ) -> Result<(), RevocationError> {
        let entry = parse_crl_data(crl_bytes, issuer)?;
        self.cache_crl((issuer.fingerprint(), url.to_string()), entry);
        Ok(())
    }

    async fn check_against_crl(
        &self,
        serial: &[u8],
        issuer: &Certificate,
        crl_url: &str,
    ) -> Result<bool, RevocationError> {
        let key = (issuer.fingerprint(), crl_url.to_string());
        if let Some(cached) = self.get_cached_crl(&key)
            && !self.is_expired(&cached)
        {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("CRL cache hit for URL: {}", crl_url);
            return Ok(cached.revoked_serials.contains(serial));
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let crl_bytes = self.download(crl_url).await?;
        let entry = parse_crl_data(&crl_bytes, issuer)?;
        let revoked = entry.revoked_serials.contains(serial);
        self.cache_crl(key, entry);
        Ok(revoked)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RevocationError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RevocationError::Network(format!("CRL download failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RevocationError::Network(format!(
                "CRL server returned status: {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| RevocationError::Network(format!("Failed to read CRL: {e}")))
    }

    fn get_cached_crl(&self, key: &CrlKey) -> Option<CrlCacheEntry> {
        match self.cache.read() {
            Ok(cache) => cache.get(key).cloned(),
            Err(poisoned) => {
                tracing::warn!("CRL cache read lock poisoned, recovering");
                poisoned.into_inner().get(key).cloned()
            }
        }
    }

    fn cache_crl(&self, key: CrlKey, entry: CrlCacheEntry) {
        match self.cache.write() {
            Ok(mut cache) => {
                cache.insert(key, entry);
            }
            Err(poisoned) => {
                tracing::warn!("CRL cache write lock poisoned, recovering");
                poisoned.into_inner().insert(key, entry);
            }
        }
    }

    fn is_expired(&self, entry: &CrlCacheEntry) -> bool {
        let now = SystemTime::now();
        if let Some(next_update) = entry.next_update {
            return now > next_update;
        }
        now.duration_since(entry.cached_at).unwrap_or(Duration::ZERO) > self.ttl
    }
}

#[async_trait]
impl RevocationChecker for CrlRevocationChecker {
    async fn check(
        &self,
        certificate: &Certificate,
        issuer: &Certificate,
    ) -> Result<RevocationStatus, RevocationError> {
        if certificate.crl_urls().is_empty() {
            return Err(RevocationError::NoSource(certificate.subject().to_string()));
        }

        let mut last_error = None;
        let mut answered = false;
        for crl_url in certificate.crl_urls() {
            match self.check_against_crl(certificate.serial(), issuer, crl_url).await {
                Ok(true) => {
                    tracing::warn!(
                        "Certificate serial {} found in CRL from {}",
                        certificate.serial_hex(),
                        crl_url
                    );
                    return Ok(RevocationStatus::Revoked);
                }
                Ok(false) => answered = true,
                Err(e) => {
                    tracing::warn!("CRL check failed for URL {}: {}", crl_url, e);
                    last_error = Some(e);
                }
            }
        }

        match (answered, last_error) {
            (true, _) => Ok(RevocationStatus::Good),
            (false, Some(e)) => Err(e),
            (false, None) => Ok(RevocationStatus::Unknown),
        }
    }
}

fn parse_crl_data(crl_bytes: &[u8], issuer: &Certificate) -> Result<CrlCacheEntry, RevocationError> {
    let der_bytes = if crl_bytes.starts_with(b"-----BEGIN") {
        let crl_pem = std::str::from_utf8(crl_bytes)
            .map_err(|_| RevocationError::Malformed("Invalid UTF-8 in PEM CRL".to_string()))?;
        ::pem::parse_many(crl_pem)
            .map_err(|e| RevocationError::Malformed(format!("Invalid PEM CRL: {e}")))?
            .into_iter()
            .find(|block| block.tag() == "X509 CRL")
            .map(::pem::Pem::into_contents)
            .ok_or_else(|| RevocationError::Malformed("No CRL data found in PEM".to_string()))?
    } else {
        crl_bytes.to_vec()
    };

    let (_, crl) = parse_x509_crl(&der_bytes)
        .map_err(|e| RevocationError::Malformed(format!("CRL parsing failed: {e}")))?;
    authenticate_crl(&crl, issuer)?;

    let revoked_serials: HashSet<Vec<u8>> = crl
        .iter_revoked_certificates()
        .map(|revoked| normalize_serial(revoked.raw_serial()))
        .collect();

    let next_update = crl.next_update().map(|time| {
        #[allow(clippy::cast_sign_loss)]
        {
            std::time::UNIX_EPOCH + Duration::from_secs(time.timestamp().max(0) as u64)
        }
    });

    tracing::info!(
        "Parsed CRL with {} revoked certificates, next update: {:?}",
        revoked_serials.len(),
        next_update
    );

    Ok(CrlCacheEntry {
        revoked_serials,
        cached_at: SystemTime::now(),
        next_update,
    })
}

/// Accept a CRL only if `issuer` both names and signed it
fn authenticate_crl(
    crl: &CertificateRevocationList<'_>,
    issuer: &Certificate,
) -> Result<(), RevocationError> {
    if crl.issuer().as_raw() != issuer.subject_raw() {
        return Err(RevocationError::Malformed(format!(
            "CRL issued by '{}', expected '{}'",
            crl.issuer(),
            issuer.subject()
        )));
    }

    let (_, issuer_x509) = X509Certificate::from_der(issuer.der())
        .map_err(|e| RevocationError::Malformed(format!("Unreadable CRL issuer: {e}")))?;
    crl.verify_signature(issuer_x509.public_key()).map_err(|e| {
        RevocationError::Malformed(format!(
            "CRL signature does not verify against '{}': {e}",
            issuer.subject()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CertificateBuilder, IssuerRef, RequestBuilder};
    use crate::key_material::{KeyAlgorithm, KeyMaterial};
    use crate::store::CertificateBundle;

    const CRL_URL: &str = "http://crl.fleet.test/devices.crl";

    fn authority(builder: &CertificateBuilder, name: &str) -> CertificateBundle {
        let key = KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation");
        builder
            .issue(RequestBuilder::root_ca(name, key).build(), IssuerRef::SelfSigned)
            .expect("ca")
    }

    fn device(builder: &CertificateBuilder, ca: &CertificateBundle, name: &str) -> CertificateBundle {
        let key = KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation");
        builder
            .issue(
                RequestBuilder::device(name, key).crl_url(CRL_URL).build(),
                IssuerRef::from_bundle(ca).expect("ca key"),
            )
            .expect("device")
    }

    /// DER CRL signed by `signer` listing `revoked`
    fn crl_signed_by(signer: &CertificateBundle, revoked: &[&Certificate]) -> Vec<u8> {
        let now = ::time::OffsetDateTime::now_utc();
        let params = rcgen::CertificateRevocationListParams {
            this_update: now,
            next_update: now + ::time::Duration::days(1),
            crl_number: rcgen::SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: revoked
                .iter()
                .map(|certificate| rcgen::RevokedCertParams {
                    serial_number: rcgen::SerialNumber::from_slice(certificate.serial()),
                    revocation_time: now,
                    reason_code: None,
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: rcgen::KeyIdMethod::Sha256,
        };
        let key = signer.private_key().expect("ca key").signer().expect("signer");
        let issuer = rcgen::Issuer::from_ca_cert_pem(&signer.certificate().to_pem(), key)
            .expect("issuer");
        params.signed_by(&issuer).expect("crl signing").der().to_vec()
    }

    #[test]
    fn test_rejects_garbage_crl() {
        let ca = authority(&CertificateBuilder::new(), "Garbage CA");
        assert!(matches!(
            parse_crl_data(b"not a crl", ca.certificate()),
            Err(RevocationError::Malformed(_))
        ));
        assert!(matches!(
            parse_crl_data(
                b"-----BEGIN X509 CRL-----\n-----END X509 CRL-----\n",
                ca.certificate()
            ),
            Err(RevocationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_certificate_without_distribution_point() {
        let key = KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation");
        let bundle = CertificateBuilder::new()
            .issue(RequestBuilder::new("no-cdp", key).build(), IssuerRef::SelfSigned)
            .expect("issuance");

        let checker = CrlRevocationChecker::new(&EngineConfig::default()).expect("client");
        assert!(matches!(
            checker.check(bundle.certificate(), bundle.certificate()).await,
            Err(RevocationError::NoSource(_))
        ));
        assert_eq!(checker.stats(), (0, 0));
    }

    #[tokio::test]
    async fn test_preloaded_crl_answers_from_cache() {
        let builder = CertificateBuilder::new();
        let ca = authority(&builder, "CRL Test CA");
        let revoked = device(&builder, &ca, "device-revoked");
        let good = device(&builder, &ca, "device-good");

        let checker = CrlRevocationChecker::new(&EngineConfig::default()).expect("client");
        let crl = crl_signed_by(&ca, &[revoked.certificate()]);
        checker.preload(ca.certificate(), CRL_URL, &crl).expect("preload");

        assert_eq!(
            checker
                .check(revoked.certificate(), ca.certificate())
                .await
                .expect("revoked lookup"),
            RevocationStatus::Revoked
        );
        assert_eq!(
            checker
                .check(good.certificate(), ca.certificate())
                .await
                .expect("good lookup"),
            RevocationStatus::Good
        );
        assert_eq!(checker.stats(), (2, 0));
    }

    #[test]
    fn test_crl_from_another_authority_is_refused() {
        let builder = CertificateBuilder::new();
        let ca = authority(&builder, "Real CA");
        let victim = device(&builder, &ca, "device-01");
        let checker = CrlRevocationChecker::new(&EngineConfig::default()).expect("client");

        let other_name = authority(&builder, "Rogue CA");
        let forged = crl_signed_by(&other_name, &[victim.certificate()]);
        assert!(matches!(
            checker.preload(ca.certificate(), CRL_URL, &forged),
            Err(RevocationError::Malformed(_))
        ));

        let same_name = authority(&builder, "Real CA");
        let forged = crl_signed_by(&same_name, &[victim.certificate()]);
        assert!(matches!(
            checker.preload(ca.certificate(), CRL_URL, &forged),
            Err(RevocationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_crl_answers_only_for_its_issuer() {
        let builder = CertificateBuilder::new();
        let first = authority(&builder, "First CA");
        let second = authority(&builder, "Second CA");
        let listed = device(&builder, &first, "device-01");

        let checker = CrlRevocationChecker::new(&EngineConfig::default()).expect("client");
        checker
            .preload(first.certificate(), CRL_URL, &crl_signed_by(&first, &[listed.certificate()]))
            .expect("first preload");
        checker
            .preload(second.certificate(), CRL_URL, &crl_signed_by(&second, &[]))
            .expect("second preload");

        assert_eq!(
            checker
                .check(listed.certificate(), first.certificate())
                .await
                .expect("lookup"),
            RevocationStatus::Revoked
        );
    }
}
