//! Certificate requests and their fluent builder

use std::net::IpAddr;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::config::EngineConfig;
use crate::error::IssueError;
use crate::key_material::KeyPair;
use crate::validator::hostname::is_valid_dns_name;

const MAX_COMMON_NAME_LEN: usize = 64;

/// Key usage bits a request may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    /// digitalSignature
    DigitalSignature,
    /// keyEncipherment
    KeyEncipherment,
    /// keyCertSign
    KeyCertSign,
    /// cRLSign
    CrlSign,
}

/// Extended key usage purposes a request may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedKeyUsage {
    /// TLS server authentication
    ServerAuth,
    /// TLS client authentication
    ClientAuth,
}

/// Subject distinguished name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectName {
    /// CN
    pub common_name: String,
    /// O
    pub organization: Option<String>,
    /// OU
    pub organizational_unit: Option<String>,
    /// C, two letters
    pub country: Option<String>,
}

impl SubjectName {
    /// Subject with only a common name
    #[must_use]
    pub fn common_name(cn: impl Into<String>) -> Self {
        Self {
            common_name: cn.into(),
            organization: None,
            organizational_unit: None,
            country: None,
        }
    }

    fn validate(&self) -> Result<(), IssueError> {
        if self.common_name.trim().is_empty() {
            return Err(IssueError::InvalidRequest(
                "Subject common name must not be empty".to_string(),
            ));
        }
        if self.common_name.chars().count() > MAX_COMMON_NAME_LEN {
            return Err(IssueError::InvalidRequest(format!(
                "Subject common name exceeds {MAX_COMMON_NAME_LEN} characters"
            )));
        }

        let attributes = [
            Some(&self.common_name),
            self.organization.as_ref(),
            self.organizational_unit.as_ref(),
            self.country.as_ref(),
        ];
        if attributes
            .iter()
            .flatten()
            .any(|value| value.chars().any(char::is_control))
        {
            return Err(IssueError::InvalidRequest(
                "Subject contains control characters".to_string(),
            ));
        }

        if let Some(country) = &self.country
            && (country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(IssueError::InvalidRequest(format!(
                "Country must be a two-letter code, got '{country}'"
            )));
        }
        Ok(())
    }
}

/// A request for a new certificate
///
/// Owns the subject's key pair; the issued bundle takes it over.
#[derive(Debug)]
pub struct CertificateRequest {
    pub(crate) subject: SubjectName,
    pub(crate) subject_key: KeyPair,
    pub(crate) not_before: DateTime<Utc>,
    pub(crate) not_after: DateTime<Utc>,
    pub(crate) key_usage: Vec<KeyUsage>,
    pub(crate) extended_key_usage: Vec<ExtendedKeyUsage>,
    pub(crate) dns_names: Vec<String>,
    pub(crate) ip_addresses: Vec<IpAddr>,
    pub(crate) is_ca: bool,
    pub(crate) path_len: Option<u8>,
    pub(crate) crl_urls: Vec<String>,
}

impl CertificateRequest {
    /// Subject name
    #[must_use]
    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    /// Subject key pair
    #[must_use]
    pub fn subject_key(&self) -> &KeyPair {
        &self.subject_key
    }

    /// Requested validity start
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Requested validity end
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether a CA certificate is requested
    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Check subject, window and extensions
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` describing the first problem found
    pub fn validate(&self) -> Result<(), IssueError> {
        self.subject.validate()?;

        if self.not_before >= self.not_after {
            return Err(IssueError::InvalidRequest(format!(
                "Validity start {} is not before end {}",
                self.not_before, self.not_after
            )));
        }

        for name in &self.dns_names {
            if !is_valid_dns_name(name, true) {
                return Err(IssueError::InvalidRequest(format!(
                    "Malformed DNS subject alternative name '{name}'"
                )));
            }
        }

        if self.path_len.is_some() && !self.is_ca {
            return Err(IssueError::InvalidRequest(
                "Path length constraint requires a CA request".to_string(),
            ));
        }
        if self.key_usage.contains(&KeyUsage::KeyCertSign) && !self.is_ca {
            return Err(IssueError::InvalidRequest(
                "keyCertSign requires a CA request".to_string(),
            ));
        }

        for url in &self.crl_urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(IssueError::InvalidRequest(format!(
                    "CRL distribution point must be an HTTP URL: {url}"
                )));
            }
        }
        Ok(())
    }
}

/// Fluent construction of [`CertificateRequest`]
///
/// ```no_run
/// use cryypt_pki::{KeyAlgorithm, KeyMaterial, RequestBuilder};
///
/// # fn main() -> cryypt_pki::Result<()> {
/// let key = KeyMaterial::default().generate(KeyAlgorithm::EcP256)?;
/// let request = RequestBuilder::device("device-01", key)
///     .organization("Acme")
///     .valid_for_days(90)
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RequestBuilder {
    subject: SubjectName,
    subject_key: KeyPair,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_usage: Vec<KeyUsage>,
    extended_key_usage: Vec<ExtendedKeyUsage>,
    dns_names: Vec<String>,
    ip_addresses: Vec<IpAddr>,
    is_ca: bool,
    path_len: Option<u8>,
    crl_urls: Vec<String>,
}

impl RequestBuilder {
    /// Start a request valid for one year from now
    #[must_use]
    pub fn new(common_name: impl Into<String>, subject_key: KeyPair) -> Self {
        let now = Utc::now().trunc_subsecs(0);
        Self {
            subject: SubjectName::common_name(common_name),
            subject_key,
            not_before: now,
            not_after: now + Duration::days(365),
            key_usage: Vec::new(),
            extended_key_usage: Vec::new(),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            is_ca: false,
            path_len: None,
            crl_urls: Vec::new(),
        }
    }

    /// Self-signed root CA preset, valid for ten years
    #[must_use]
    pub fn root_ca(common_name: impl Into<String>, subject_key: KeyPair) -> Self {
        Self::new(common_name, subject_key)
            .ca(None)
            .key_usage(&[
                KeyUsage::KeyCertSign,
                KeyUsage::CrlSign,
                KeyUsage::DigitalSignature,
            ])
            .valid_for_days(3650)
    }

    /// Intermediate CA preset, valid for five years, may only sign leaves
    #[must_use]
    pub fn intermediate_ca(common_name: impl Into<String>, subject_key: KeyPair) -> Self {
        Self::new(common_name, subject_key)
            .ca(Some(0))
            .key_usage(&[
                KeyUsage::KeyCertSign,
                KeyUsage::CrlSign,
                KeyUsage::DigitalSignature,
            ])
            .valid_for_days(1825)
    }

    /// Device leaf preset for mutual TLS; the device id is the CN and a DNS SAN
    #[must_use]
    pub fn device(device_id: impl Into<String>, subject_key: KeyPair) -> Self {
        let device_id = device_id.into();
        Self::new(device_id.clone(), subject_key)
            .dns_name(device_id)
            .key_usage(&[KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment])
            .extended_key_usage(&[ExtendedKeyUsage::ClientAuth, ExtendedKeyUsage::ServerAuth])
    }

    /// Set organization (O)
    #[must_use]
    pub fn organization(self, organization: impl Into<String>) -> Self {
        Self {
            subject: SubjectName {
                organization: Some(organization.into()),
                ..self.subject
            },
            ..self
        }
    }

    /// Set organizational unit (OU)
    #[must_use]
    pub fn organizational_unit(self, unit: impl Into<String>) -> Self {
        Self {
            subject: SubjectName {
                organizational_unit: Some(unit.into()),
                ..self.subject
            },
            ..self
        }
    }

    /// Set country (C)
    #[must_use]
    pub fn country(self, country: impl Into<String>) -> Self {
        Self {
            subject: SubjectName {
                country: Some(country.into()),
                ..self.subject
            },
            ..self
        }
    }

    /// Explicit validity window; sub-second precision is dropped
    #[must_use]
    pub fn valid_between(self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        Self {
            not_before: not_before.trunc_subsecs(0),
            not_after: not_after.trunc_subsecs(0),
            ..self
        }
    }

    /// Validity of `days` starting at the current start
    #[must_use]
    pub fn valid_for_days(self, days: u32) -> Self {
        let not_after = self.not_before + Duration::days(i64::from(days));
        Self { not_after, ..self }
    }

    /// Validity of the engine's `default_validity_days` from the current start
    #[must_use]
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.valid_for_days(config.default_validity_days)
    }

    /// Add a DNS subject alternative name
    #[must_use]
    pub fn dns_name(mut self, name: impl Into<String>) -> Self {
        self.dns_names.push(name.into());
        self
    }

    /// Add an IP subject alternative name
    #[must_use]
    pub fn ip_address(mut self, ip: IpAddr) -> Self {
        self.ip_addresses.push(ip);
        self
    }

    /// Replace the key usage set
    #[must_use]
    pub fn key_usage(self, usages: &[KeyUsage]) -> Self {
        Self {
            key_usage: usages.to_vec(),
            ..self
        }
    }

    /// Replace the extended key usage set
    #[must_use]
    pub fn extended_key_usage(self, usages: &[ExtendedKeyUsage]) -> Self {
        Self {
            extended_key_usage: usages.to_vec(),
            ..self
        }
    }

    /// Mark as CA with an optional path length constraint
    #[must_use]
    pub fn ca(self, path_len: Option<u8>) -> Self {
        Self {
            is_ca: true,
            path_len,
            ..self
        }
    }

    /// Set a path length without the CA flag; rejected at issuance
    #[must_use]
    pub fn path_len(self, path_len: u8) -> Self {
        Self {
            path_len: Some(path_len),
            ..self
        }
    }

    /// Add a CRL distribution point URL
    #[must_use]
    pub fn crl_url(mut self, url: impl Into<String>) -> Self {
        self.crl_urls.push(url.into());
        self
    }

    /// Freeze into a request
    #[must_use]
    pub fn build(self) -> CertificateRequest {
        CertificateRequest {
            subject: self.subject,
            subject_key: self.subject_key,
            not_before: self.not_before,
            not_after: self.not_after,
            key_usage: self.key_usage,
            extended_key_usage: self.extended_key_usage,
            dns_names: self.dns_names,
            ip_addresses: self.ip_addresses,
            is_ca: self.is_ca,
            path_len: self.path_len,
            crl_urls: self.crl_urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_material::{KeyAlgorithm, KeyMaterial};

    fn key() -> KeyPair {
        KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation")
    }

    #[test]
    fn test_device_preset_is_valid() {
        let request = RequestBuilder::device("device-01", key()).build();
        assert!(request.validate().is_ok());
        assert_eq!(request.dns_names, vec!["device-01".to_string()]);
        assert!(!request.is_ca());
    }

    #[test]
    fn test_config_sets_default_validity() {
        use crate::builder::{CertificateBuilder, IssuerRef};

        let config = EngineConfig::embedded_device();
        let issued = CertificateBuilder::new()
            .issue(
                RequestBuilder::device("device-01", key()).with_config(&config).build(),
                IssuerRef::SelfSigned,
            )
            .expect("issuance");
        let certificate = issued.certificate();
        assert_eq!(
            certificate.not_after() - certificate.not_before(),
            Duration::days(i64::from(config.default_validity_days))
        );
        assert_ne!(
            config.default_validity_days,
            EngineConfig::default().default_validity_days
        );
    }

    #[test]
    fn test_empty_common_name_rejected() {
        let request = RequestBuilder::new("  ", key()).build();
        assert!(matches!(
            request.validate(),
            Err(IssueError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_control_characters_rejected() {
        let request = RequestBuilder::new("dev\nice", key()).build();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let now = Utc::now();
        let request = RequestBuilder::new("device", key())
            .valid_between(now, now - Duration::hours(1))
            .build();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_path_len_requires_ca() {
        let request = RequestBuilder::new("device", key()).path_len(1).build();
        assert!(request.validate().is_err());

        let request = RequestBuilder::new("ca", key()).ca(Some(1)).build();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_bad_san_rejected() {
        let request = RequestBuilder::new("device", key())
            .dns_name("foo.*.example.com")
            .build();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_bad_country_rejected() {
        let request = RequestBuilder::new("device", key()).country("USA").build();
        assert!(request.validate().is_err());
    }
}
