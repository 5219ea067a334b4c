//! Certificate issuance

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, CrlDistributionPoint, DistinguishedName, DnType, IsCa,
    KeyUsagePurpose, SanType, SerialNumber,
};

use super::request::{CertificateRequest, ExtendedKeyUsage, KeyUsage};
use super::serial::{IssuerScope, SerialAllocator};
use crate::certificate::Certificate;
use crate::error::IssueError;
use crate::key_material::KeyPair;
use crate::store::CertificateBundle;

/// Who signs an issued certificate
#[derive(Debug, Clone, Copy)]
pub enum IssuerRef<'a> {
    /// Signed with the request's own key; issuer equals subject
    SelfSigned,
    /// Signed by an existing CA
    Ca {
        /// CA private key
        key: &'a KeyPair,
        /// CA certificate
        certificate: &'a Certificate,
        /// Certificates above the CA, copied into the issued bundle
        chain: &'a [Certificate],
    },
}

impl<'a> IssuerRef<'a> {
    /// CA issuer without a chain above it
    #[must_use]
    pub fn ca(key: &'a KeyPair, certificate: &'a Certificate) -> Self {
        IssuerRef::Ca {
            key,
            certificate,
            chain: &[],
        }
    }

    /// CA issuer taken from a bundle that holds its private key
    ///
    /// # Errors
    ///
    /// Returns `SigningFailure` if the bundle has no private key
    pub fn from_bundle(bundle: &'a CertificateBundle) -> Result<Self, IssueError> {
        let key = bundle.private_key().ok_or_else(|| {
            IssueError::SigningFailure(format!(
                "Issuer bundle '{}' has no private key",
                bundle.certificate().subject()
            ))
        })?;
        Ok(IssuerRef::Ca {
            key,
            certificate: bundle.certificate(),
            chain: bundle.chain(),
        })
    }
}

/// Issues self-signed and CA-signed certificates
///
/// Cloning shares the serial registry, so clones never repeat a serial for
/// the same issuer either.
#[derive(Debug, Clone, Default)]
pub struct CertificateBuilder {
    serials: Arc<SerialAllocator>,
}

impl CertificateBuilder {
    /// Create a builder with an empty serial registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a certificate at the current time
    ///
    /// # Errors
    ///
    /// See [`CertificateBuilder::issue_at`]
    pub fn issue(
        &self,
        request: CertificateRequest,
        issuer: IssuerRef<'_>,
    ) -> Result<CertificateBundle, IssueError> {
        self.issue_at(request, issuer, Utc::now())
    }

    /// Issue a certificate as of `issued_at`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the request is malformed or its window falls outside the issuer's (`InvalidRequest`)
    /// - the issuer certificate is not valid at `issued_at` (`ExpiredIssuer`)
    /// - the issuer key does not belong to the issuer certificate, or signing fails (`SigningFailure`)
    pub fn issue_at(
        &self,
        request: CertificateRequest,
        issuer: IssuerRef<'_>,
        issued_at: DateTime<Utc>,
    ) -> Result<CertificateBundle, IssueError> {
        request.validate()?;

        if let IssuerRef::Ca {
            key, certificate, ..
        } = issuer
        {
            check_issuer(&request, key, certificate, issued_at)?;
        }

        let signing_key = match issuer {
            IssuerRef::SelfSigned => &request.subject_key,
            IssuerRef::Ca { key, .. } => key,
        };
        let scope = IssuerScope::for_public_key(signing_key.public_key_raw());
        let serial = self.serials.allocate(scope);

        let params = build_params(&request, &serial)?;
        let signer = signing_key
            .signer()
            .map_err(|e| IssueError::SigningFailure(e.to_string()))?;

        let issued = match issuer {
            IssuerRef::SelfSigned => params.self_signed(&signer),
            IssuerRef::Ca { certificate, .. } => {
                let subject_key = request.subject_key.signer().map_err(|e| {
                    IssueError::InvalidRequest(format!("Subject key unusable: {e}"))
                })?;
                let ca_issuer = rcgen::Issuer::from_ca_cert_pem(&certificate.to_pem(), signer)
                    .map_err(|e| {
                        IssueError::SigningFailure(format!("Failed to load CA issuer: {e}"))
                    })?;
                params.signed_by(&subject_key, &ca_issuer)
            }
        }
        .map_err(|e| IssueError::SigningFailure(e.to_string()))?;

        let certificate = Certificate::from_der(issued.der()).map_err(|e| {
            IssueError::SigningFailure(format!("Signer produced an unreadable certificate: {e}"))
        })?;

        tracing::info!(
            "Issued certificate '{}' serial {} by '{}'",
            certificate.subject(),
            certificate.serial_hex(),
            certificate.issuer()
        );

        let chain = match issuer {
            IssuerRef::SelfSigned => Vec::new(),
            IssuerRef::Ca {
                certificate: ca,
                chain,
                ..
            } => std::iter::once(ca).chain(chain).cloned().collect(),
        };

        Ok(CertificateBundle::new(certificate)
            .with_private_key(request.subject_key)
            .with_chain(chain))
    }
}

fn check_issuer(
    request: &CertificateRequest,
    key: &KeyPair,
    certificate: &Certificate,
    issued_at: DateTime<Utc>,
) -> Result<(), IssueError> {
    if !certificate.is_valid_at(issued_at) {
        return Err(IssueError::ExpiredIssuer {
            issuer: certificate.subject().to_string(),
        });
    }
    if !certificate.is_ca() {
        return Err(IssueError::InvalidRequest(format!(
            "Issuer '{}' is not a CA",
            certificate.subject()
        )));
    }
    if request.is_ca
        && certificate
            .basic_constraints()
            .and_then(|bc| bc.path_len)
            .is_some_and(|len| len == 0)
    {
        return Err(IssueError::InvalidRequest(format!(
            "Issuer '{}' may not sign subordinate CAs",
            certificate.subject()
        )));
    }
    if request.not_before < certificate.not_before() || request.not_after > certificate.not_after()
    {
        return Err(IssueError::InvalidRequest(format!(
            "Requested validity {}..{} exceeds issuer validity {}..{}",
            request.not_before,
            request.not_after,
            certificate.not_before(),
            certificate.not_after()
        )));
    }
    if key.public_key_raw() != certificate.public_key_raw() {
        return Err(IssueError::SigningFailure(format!(
            "Key does not match issuer certificate '{}'",
            certificate.subject()
        )));
    }
    Ok(())
}

fn build_params(request: &CertificateRequest, serial: &[u8]) -> Result<CertificateParams, IssueError> {
    let mut params = CertificateParams::default();

    let subject = &request.subject;
    let mut dn = DistinguishedName::new();
    if let Some(country) = &subject.country {
        dn.push(DnType::CountryName, country.as_str());
    }
    if let Some(organization) = &subject.organization {
        dn.push(DnType::OrganizationName, organization.as_str());
    }
    if let Some(unit) = &subject.organizational_unit {
        dn.push(DnType::OrganizationalUnitName, unit.as_str());
    }
    dn.push(DnType::CommonName, subject.common_name.as_str());
    params.distinguished_name = dn;

    params.not_before = to_offset(request.not_before)?;
    params.not_after = to_offset(request.not_after)?;
    params.serial_number = Some(SerialNumber::from_slice(serial));

    params.is_ca = if request.is_ca {
        match request.path_len {
            Some(len) => IsCa::Ca(BasicConstraints::Constrained(len)),
            None => IsCa::Ca(BasicConstraints::Unconstrained),
        }
    } else {
        IsCa::ExplicitNoCa
    };

    params.key_usages = request
        .key_usage
        .iter()
        .map(|usage| match usage {
            KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            KeyUsage::KeyCertSign => KeyUsagePurpose::KeyCertSign,
            KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
        })
        .collect();

    params.extended_key_usages = request
        .extended_key_usage
        .iter()
        .map(|usage| match usage {
            ExtendedKeyUsage::ServerAuth => rcgen::ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsage::ClientAuth => rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        })
        .collect();

    let mut san_entries = Vec::with_capacity(request.dns_names.len() + request.ip_addresses.len());
    for name in &request.dns_names {
        san_entries.push(SanType::DnsName(name.as_str().try_into().map_err(
            |e: rcgen::Error| IssueError::InvalidRequest(format!("Invalid DNS name '{name}': {e}")),
        )?));
    }
    san_entries.extend(request.ip_addresses.iter().copied().map(SanType::IpAddress));
    params.subject_alt_names = san_entries;

    if !request.crl_urls.is_empty() {
        params.crl_distribution_points = vec![CrlDistributionPoint {
            uris: request.crl_urls.clone(),
        }];
    }

    Ok(params)
}

fn to_offset(at: DateTime<Utc>) -> Result<time::OffsetDateTime, IssueError> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| IssueError::InvalidRequest(format!("Validity time out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::builder::RequestBuilder;
    use crate::key_material::{KeyAlgorithm, KeyMaterial};

    fn key() -> KeyPair {
        KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation")
    }

    fn root(builder: &CertificateBuilder) -> CertificateBundle {
        builder
            .issue(
                RequestBuilder::root_ca("Test Root", key()).build(),
                IssuerRef::SelfSigned,
            )
            .expect("root issuance")
    }

    #[test]
    fn test_self_signed_root() {
        let builder = CertificateBuilder::new();
        let bundle = root(&builder);
        let cert = bundle.certificate();

        assert!(cert.is_self_signed());
        assert!(cert.is_ca());
        assert_eq!(cert.serial().len(), 16);
        assert!(bundle.private_key().is_some());
        assert!(bundle.chain().is_empty());
    }

    #[test]
    fn test_leaf_signed_by_root() {
        let builder = CertificateBuilder::new();
        let root = root(&builder);
        let issuer = IssuerRef::from_bundle(&root).expect("root has key");

        let leaf = builder
            .issue(RequestBuilder::device("device-01", key()).build(), issuer)
            .expect("leaf issuance");

        assert_eq!(leaf.certificate().issuer_raw(), root.certificate().subject_raw());
        assert!(leaf.certificate().is_signed_by(root.certificate()));
        assert!(!leaf.certificate().is_ca());
        assert_eq!(leaf.certificate().san_dns_names(), ["device-01".to_string()]);
        assert_eq!(leaf.chain(), [root.certificate().clone()]);
    }

    #[test]
    fn test_serials_unique_per_issuer() {
        let builder = CertificateBuilder::new();
        let root = root(&builder);
        let issuer = IssuerRef::from_bundle(&root).expect("root has key");

        let mut serials = std::collections::HashSet::new();
        for i in 0..8 {
            let leaf = builder
                .issue(
                    RequestBuilder::device(format!("device-{i}"), key()).build(),
                    issuer,
                )
                .expect("leaf issuance");
            assert!(serials.insert(leaf.certificate().serial().to_vec()));
        }
    }

    #[test]
    fn test_expired_issuer() {
        let builder = CertificateBuilder::new();
        let root = root(&builder);
        let issuer = IssuerRef::from_bundle(&root).expect("root has key");
        let later = root.certificate().not_after() + Duration::seconds(1);

        let err = builder
            .issue_at(RequestBuilder::device("device-01", key()).build(), issuer, later)
            .unwrap_err();
        assert!(matches!(err, IssueError::ExpiredIssuer { .. }));
    }

    #[test]
    fn test_window_beyond_issuer_rejected() {
        let builder = CertificateBuilder::new();
        let root = root(&builder);
        let issuer = IssuerRef::from_bundle(&root).expect("root has key");

        let request = RequestBuilder::device("device-01", key())
            .valid_between(
                root.certificate().not_before(),
                root.certificate().not_after() + Duration::days(1),
            )
            .build();
        assert!(matches!(
            builder.issue(request, issuer),
            Err(IssueError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_mismatched_issuer_key() {
        let builder = CertificateBuilder::new();
        let root = root(&builder);
        let stranger = key();

        let err = builder
            .issue(
                RequestBuilder::device("device-01", key()).build(),
                IssuerRef::ca(&stranger, root.certificate()),
            )
            .unwrap_err();
        assert!(matches!(err, IssueError::SigningFailure(_)));
    }

    #[test]
    fn test_non_ca_issuer_rejected() {
        let builder = CertificateBuilder::new();
        let root = root(&builder);
        let leaf = builder
            .issue(
                RequestBuilder::device("device-01", key()).build(),
                IssuerRef::from_bundle(&root).expect("root has key"),
            )
            .expect("leaf issuance");

        let err = builder
            .issue(
                RequestBuilder::device("device-02", key()).build(),
                IssuerRef::from_bundle(&leaf).expect("leaf has key"),
            )
            .unwrap_err();
        assert!(matches!(err, IssueError::InvalidRequest(_)));
    }

    #[test]
    fn test_rsa_root_signs_ec_leaf() {
        let builder = CertificateBuilder::new();
        let rsa_key = KeyMaterial::default()
            .generate(KeyAlgorithm::Rsa { bits: 2048 })
            .expect("RSA key generation");
        let root = builder
            .issue(
                RequestBuilder::root_ca("RSA Root", rsa_key).build(),
                IssuerRef::SelfSigned,
            )
            .expect("RSA root issuance");
        assert!(root.certificate().is_self_signed());

        let leaf = builder
            .issue(
                RequestBuilder::device("device-01", key()).build(),
                IssuerRef::from_bundle(&root).expect("root has key"),
            )
            .expect("leaf issuance");
        assert!(leaf.certificate().is_signed_by(root.certificate()));
    }
}
