//! `rustls` verifiers backed by the session authenticator

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustls::DigitallySignedStruct;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};

use super::{HandshakeDecision, SecureSessionAuthenticator};

/// Certificate verifier for both sides of a mutual-TLS handshake
///
/// Chain trust is decided by [`SecureSessionAuthenticator::decide`], so
/// revocation answers must have been prefetched. Stapled OCSP responses are
/// not consulted; revocation comes only from the validator's checker.
/// Handshake signatures are checked with the provider's algorithms.
#[derive(Debug)]
pub struct PeerVerifier {
    authenticator: SecureSessionAuthenticator,
    expected_client: Option<String>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PeerVerifier {
    /// Verifier using `provider`'s signature algorithms
    #[must_use]
    pub fn new(authenticator: SecureSessionAuthenticator, provider: &CryptoProvider) -> Self {
        Self {
            authenticator,
            expected_client: None,
            algorithms: provider.signature_verification_algorithms,
        }
    }

    /// Require client certificates to name `identity` (server side only)
    #[must_use]
    pub fn with_expected_client(self, identity: impl Into<String>) -> Self {
        Self {
            expected_client: Some(identity.into()),
            ..self
        }
    }

    fn verify_peer(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        expected_identity: Option<&str>,
        now: UnixTime,
    ) -> Result<(), rustls::Error> {
        let reference_time = i64::try_from(now.as_secs())
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        match self.authenticator.decide_at(
            &**end_entity,
            intermediates.iter().map(|der| &**der),
            expected_identity,
            reference_time,
        ) {
            HandshakeDecision::Accept { .. } => Ok(()),
            HandshakeDecision::Reject { reason } => Err(rustls::Error::General(reason)),
        }
    }
}

impl ServerCertVerifier for PeerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let server_name = server_name.to_str();
        self.verify_peer(end_entity, intermediates, Some(&*server_name), now)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

impl ClientCertVerifier for PeerVerifier {
    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.verify_peer(end_entity, intermediates, self.expected_client.as_deref(), now)?;
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

pub(crate) fn ring_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
