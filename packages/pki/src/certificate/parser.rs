//! Certificate parsing with x509-parser
//!
//! Extracts everything chain validation and hostname checks need into owned
//! fields so the parsed borrow does not outlive the call.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use x509_parser::extensions::DistributionPointName;
use x509_parser::prelude::*;

use super::types::{
    BasicConstraintsInfo, Certificate, CertificateFields, ExtendedKeyUsageInfo, Fingerprint,
    KeyUsageInfo, SignatureAlgorithm,
};
use crate::error::StoreError;

/// Parse a single DER certificate; trailing bytes are rejected
pub(crate) fn parse_der(der: &[u8]) -> Result<Certificate, StoreError> {
    let (rest, x509) = X509Certificate::from_der(der)
        .map_err(|e| StoreError::MalformedEncoding(format!("X.509 parsing failed: {e}")))?;
    if !rest.is_empty() {
        return Err(StoreError::MalformedEncoding(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }

    let not_before = asn1_to_chrono(x509.validity().not_before)?;
    let not_after = asn1_to_chrono(x509.validity().not_after)?;

    let basic_constraints = x509
        .basic_constraints()
        .map_err(|e| StoreError::MalformedEncoding(format!("Basic constraints: {e}")))?
        .map(|ext| BasicConstraintsInfo {
            ca: ext.value.ca,
            path_len: ext.value.path_len_constraint,
        });

    let key_usage = x509
        .key_usage()
        .map_err(|e| StoreError::MalformedEncoding(format!("Key usage: {e}")))?
        .map(|ext| KeyUsageInfo {
            digital_signature: ext.value.digital_signature(),
            key_encipherment: ext.value.key_encipherment(),
            key_cert_sign: ext.value.key_cert_sign(),
            crl_sign: ext.value.crl_sign(),
        });

    let extended_key_usage = x509
        .extended_key_usage()
        .map_err(|e| StoreError::MalformedEncoding(format!("Extended key usage: {e}")))?
        .map(|ext| ExtendedKeyUsageInfo {
            server_auth: ext.value.server_auth,
            client_auth: ext.value.client_auth,
        });

    let (san_dns_names, san_ip_addresses) = extract_subject_alt_names(&x509)?;
    let crl_urls = extract_crl_urls(&x509);

    let common_name = x509
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    let spki = x509.public_key();

    Ok(Certificate::from_fields(CertificateFields {
        der: der.to_vec(),
        fingerprint: Fingerprint::of(der),
        serial: normalize_serial(x509.raw_serial()),
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        subject_raw: x509.subject().as_raw().to_vec(),
        issuer_raw: x509.issuer().as_raw().to_vec(),
        common_name,
        not_before,
        not_after,
        public_key_algorithm: spki.algorithm.algorithm.to_id_string(),
        public_key_raw: spki.subject_public_key.data.to_vec(),
        signature_algorithm: SignatureAlgorithm::from_oid(
            &x509.signature_algorithm.algorithm.to_id_string(),
        ),
        signature: x509.signature_value.data.to_vec(),
        basic_constraints,
        key_usage,
        extended_key_usage,
        san_dns_names,
        san_ip_addresses,
        crl_urls,
    }))
}

/// Parse every `CERTIFICATE` block of a PEM document, in order
pub(crate) fn parse_pem_chain(pem_data: &str) -> Result<Vec<Certificate>, StoreError> {
    let blocks = ::pem::parse_many(pem_data)
        .map_err(|e| StoreError::MalformedEncoding(format!("Failed to parse PEM: {e}")))?;

    blocks
        .iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| parse_der(block.contents()))
        .collect()
}

/// Check `child_der`'s signature against `issuer_der`'s subject public key
///
/// Any parse failure counts as a failed verification.
pub(crate) fn verify_signature(child_der: &[u8], issuer_der: &[u8]) -> bool {
    let Ok((_, child)) = X509Certificate::from_der(child_der) else {
        return false;
    };
    let Ok((_, issuer)) = X509Certificate::from_der(issuer_der) else {
        return false;
    };

    match child.verify_signature(Some(issuer.public_key())) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(
                "Signature of '{}' does not verify under '{}': {}",
                child.subject(),
                issuer.subject(),
                e
            );
            false
        }
    }
}

fn asn1_to_chrono(time: ASN1Time) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(time.timestamp(), 0).ok_or_else(|| {
        StoreError::MalformedEncoding(format!("Validity timestamp out of range: {time}"))
    })
}

pub(crate) fn normalize_serial(raw: &[u8]) -> Vec<u8> {
    let start = raw
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(raw.len().saturating_sub(1));
    raw[start..].to_vec()
}

fn extract_subject_alt_names(
    x509: &X509Certificate<'_>,
) -> Result<(Vec<String>, Vec<IpAddr>), StoreError> {
    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();

    let san = x509
        .subject_alternative_name()
        .map_err(|e| StoreError::MalformedEncoding(format!("Subject alternative name: {e}")))?;

    if let Some(san) = san {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                GeneralName::IPAddress(bytes) => match bytes.len() {
                    4 => {
                        let octets: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
                        ip_addresses.push(IpAddr::V4(Ipv4Addr::from(octets)));
                    }
                    16 => {
                        let mut octets = [0u8; 16];
                        octets.copy_from_slice(bytes);
                        ip_addresses.push(IpAddr::V6(Ipv6Addr::from(octets)));
                    }
                    other => {
                        tracing::warn!("Ignoring IP SAN with {} bytes", other);
                    }
                },
                _ => {}
            }
        }
    }

    Ok((dns_names, ip_addresses))
}

fn extract_crl_urls(x509: &X509Certificate<'_>) -> Vec<String> {
    let mut crl_urls = Vec::new();

    for ext in x509.extensions() {
        if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
            for point in points.iter() {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name
                            && !crl_urls.iter().any(|u| u == uri)
                        {
                            crl_urls.push((*uri).to_string());
                        }
                    }
                }
            }
        }
    }

    crl_urls
}
