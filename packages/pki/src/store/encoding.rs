//! Public and password-protected encodings of certificate bundles
//!
//! Public exports are plain DER (or PEM) and never carry key bytes. Bundle
//! exports are PKCS#12 archives, readable by standard PKI tooling.

use zeroize::Zeroizing;

use super::bundle::CertificateBundle;
use crate::certificate::Certificate;
use crate::certificate::parser::parse_pem_chain;
use crate::error::StoreError;
use crate::key_material::KeyPair;

/// DER encoding of the bundle's certificate only
#[must_use]
pub fn export_public(bundle: &CertificateBundle) -> Vec<u8> {
    bundle.certificate().der().to_vec()
}

/// PEM encoding of the certificate followed by its chain
#[must_use]
pub fn export_pem_chain(bundle: &CertificateBundle) -> String {
    bundle.certificates().map(Certificate::to_pem).collect()
}

/// PKCS#12 archive of certificate, encrypted private key and chain
///
/// # Errors
///
/// Returns an error if:
/// - the passphrase is empty (`EmptyPassphrase`)
/// - the bundle has no private key (`MissingPrivateKey`)
/// - the archive cannot be assembled (`MalformedEncoding`)
pub fn export_bundle(bundle: &CertificateBundle, passphrase: &str) -> Result<Vec<u8>, StoreError> {
    if passphrase.is_empty() {
        return Err(StoreError::EmptyPassphrase);
    }

    let certificate = bundle.certificate();
    let key = bundle
        .private_key()
        .and_then(KeyPair::private_key_pkcs8)
        .ok_or_else(|| StoreError::MissingPrivateKey(certificate.subject().to_string()))?;

    let chain: Vec<&[u8]> = bundle.chain().iter().map(Certificate::der).collect();
    let friendly_name = certificate.common_name().unwrap_or("certificate");

    let pfx = p12::PFX::new_with_cas(certificate.der(), key, &chain, passphrase, friendly_name)
        .ok_or_else(|| {
            StoreError::MalformedEncoding("Failed to assemble PKCS#12 archive".to_string())
        })?;

    tracing::debug!(
        "Exported PKCS#12 bundle for '{}' with {} chain certificates",
        certificate.subject(),
        chain.len()
    );
    Ok(pfx.to_der())
}

/// Parse a DER or PEM certificate
///
/// # Errors
///
/// Returns `MalformedEncoding` if the bytes hold no certificate
pub fn import_public(bytes: &[u8]) -> Result<Certificate, StoreError> {
    if bytes.trim_ascii_start().starts_with(b"-----BEGIN") {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| StoreError::MalformedEncoding("Invalid UTF-8 in PEM".to_string()))?;
        return Certificate::from_pem(text);
    }
    Certificate::from_der(bytes)
}

/// Parse every certificate of a PEM document, in order
///
/// # Errors
///
/// Returns `MalformedEncoding` if the PEM or any certificate in it is malformed
pub fn import_pem_chain(pem_data: &str) -> Result<Vec<Certificate>, StoreError> {
    parse_pem_chain(pem_data)
}

/// Open a PKCS#12 archive
///
/// The end-entity certificate is the one whose public key matches the
/// archived private key; every other certificate becomes the chain.
///
/// # Errors
///
/// Returns an error if:
/// - the archive is not valid PKCS#12 (`MalformedEncoding`)
/// - the passphrase does not verify the archive MAC (`DecryptionFailure`)
pub fn import_bundle(bytes: &[u8], passphrase: &str) -> Result<CertificateBundle, StoreError> {
    let pfx = p12::PFX::parse(bytes)
        .map_err(|e| StoreError::MalformedEncoding(format!("PKCS#12 parsing failed: {e:?}")))?;

    if !pfx.verify_mac(passphrase) {
        return Err(StoreError::DecryptionFailure(
            "PKCS#12 integrity check failed, wrong passphrase or tampered archive".to_string(),
        ));
    }

    let key_bags = pfx
        .key_bags(passphrase)
        .map_err(|e| StoreError::DecryptionFailure(format!("Key bag decryption failed: {e:?}")))?;
    let cert_bags = pfx.cert_x509_bags(passphrase).map_err(|e| {
        StoreError::DecryptionFailure(format!("Certificate bag decryption failed: {e:?}"))
    })?;

    let mut certificates = cert_bags
        .iter()
        .map(|der| Certificate::from_der(der))
        .collect::<Result<Vec<_>, _>>()?;
    if certificates.is_empty() {
        return Err(StoreError::MalformedEncoding(
            "PKCS#12 archive contains no certificate".to_string(),
        ));
    }

    let key = match key_bags.into_iter().next() {
        Some(der) => {
            let der = Zeroizing::new(der);
            Some(KeyPair::from_pkcs8_der(&der).map_err(|e| {
                StoreError::MalformedEncoding(format!("Archived private key: {e}"))
            })?)
        }
        None => None,
    };

    let leaf_index = key
        .as_ref()
        .and_then(|key| {
            certificates
                .iter()
                .position(|cert| cert.public_key_raw() == key.public_key_raw())
        })
        .unwrap_or(0);
    let leaf = certificates.remove(leaf_index);

    let bundle = CertificateBundle::new(leaf).with_chain(certificates);
    Ok(match key {
        Some(key) => bundle.with_private_key(key),
        None => bundle,
    })
}
