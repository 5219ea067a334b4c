//! Mutual-TLS `rustls` configurations

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, ServerConfig};

use super::SecureSessionAuthenticator;
use super::verifier::{PeerVerifier, ring_provider};
use crate::error::{PkiError, Result, StoreError};
use crate::store::CertificateBundle;

fn identity_material(
    identity: &CertificateBundle,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let pkcs8 = identity
        .private_key()
        .and_then(|key| key.private_key_pkcs8())
        .ok_or_else(|| {
            PkiError::Store(StoreError::MissingPrivateKey(
                identity.certificate().subject().to_string(),
            ))
        })?;

    let chain = identity
        .certificates()
        .map(|certificate| CertificateDer::from(certificate.der().to_vec()))
        .collect();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pkcs8.to_vec()));
    Ok((chain, key))
}

/// Client configuration presenting `identity` and verifying the server with
/// `authenticator` against the connection's server name
///
/// # Errors
///
/// Returns an error if the bundle has no private key or `rustls` rejects it
pub fn client_config(
    identity: &CertificateBundle,
    authenticator: SecureSessionAuthenticator,
) -> Result<ClientConfig> {
    let provider = ring_provider();
    let verifier = Arc::new(PeerVerifier::new(authenticator, &provider));
    let (chain, key) = identity_material(identity)?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(chain, key)?;

    tracing::debug!(
        "Built mutual-TLS client configuration for '{}'",
        identity.certificate().subject()
    );
    Ok(config)
}

/// Server configuration presenting `identity` and requiring client
/// certificates accepted by `authenticator`
///
/// When `expected_client` is set, client certificates must also name it.
///
/// # Errors
///
/// Returns an error if the bundle has no private key or `rustls` rejects it
pub fn server_config(
    identity: &CertificateBundle,
    authenticator: SecureSessionAuthenticator,
    expected_client: Option<&str>,
) -> Result<ServerConfig> {
    let provider = ring_provider();
    let mut verifier = PeerVerifier::new(authenticator, &provider);
    if let Some(expected) = expected_client {
        verifier = verifier.with_expected_client(expected);
    }
    let (chain, key) = identity_material(identity)?;

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_client_cert_verifier(Arc::new(verifier))
        .with_single_cert(chain, key)?;

    tracing::debug!(
        "Built mutual-TLS server configuration for '{}'",
        identity.certificate().subject()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use rustls::pki_types::ServerName;
    use rustls::{ClientConnection, ServerConnection};

    use super::*;
    use crate::builder::{CertificateBuilder, IssuerRef, RequestBuilder};
    use crate::key_material::{KeyAlgorithm, KeyMaterial, KeyPair};
    use crate::policy::{PolicyHandle, TrustPolicy};
    use crate::validator::ChainValidator;

    fn key() -> KeyPair {
        KeyMaterial::default()
            .generate(KeyAlgorithm::EcP256)
            .expect("EC key generation")
    }

    struct Fixture {
        authenticator: SecureSessionAuthenticator,
        broker: CertificateBundle,
        device: CertificateBundle,
    }

    fn fixture() -> Fixture {
        let builder = CertificateBuilder::new();
        let root = builder
            .issue(RequestBuilder::root_ca("Fleet Root", key()).build(), IssuerRef::SelfSigned)
            .expect("root");
        let issuer = IssuerRef::from_bundle(&root).expect("root key");
        let broker = builder
            .issue(RequestBuilder::device("broker", key()).build(), issuer)
            .expect("broker");
        let device = builder
            .issue(RequestBuilder::device("device-01", key()).build(), issuer)
            .expect("device");

        let policy = PolicyHandle::new(TrustPolicy::default().with_anchor(root.certificate().clone()));
        Fixture {
            authenticator: SecureSessionAuthenticator::new(policy, ChainValidator::default()),
            broker,
            device,
        }
    }

    fn handshake(
        client: &mut ClientConnection,
        server: &mut ServerConnection,
    ) -> std::result::Result<(), rustls::Error> {
        for _ in 0..10 {
            if !client.is_handshaking() && !server.is_handshaking() {
                return Ok(());
            }
            let mut buf = Vec::new();
            client.write_tls(&mut buf).map_err(|e| rustls::Error::General(e.to_string()))?;
            server.read_tls(&mut buf.as_slice()).map_err(|e| rustls::Error::General(e.to_string()))?;
            server.process_new_packets()?;

            buf.clear();
            server.write_tls(&mut buf).map_err(|e| rustls::Error::General(e.to_string()))?;
            client.read_tls(&mut buf.as_slice()).map_err(|e| rustls::Error::General(e.to_string()))?;
            client.process_new_packets()?;
        }
        Err(rustls::Error::General("handshake did not finish".into()))
    }

    #[test]
    fn test_mutual_handshake_succeeds() {
        let f = fixture();
        let client_cfg = client_config(&f.device, f.authenticator.clone()).expect("client config");
        let server_cfg =
            server_config(&f.broker, f.authenticator.clone(), Some("device-01")).expect("server config");

        let mut client = ClientConnection::new(
            Arc::new(client_cfg),
            ServerName::try_from("broker").expect("server name"),
        )
        .expect("client connection");
        let mut server = ServerConnection::new(Arc::new(server_cfg)).expect("server connection");

        handshake(&mut client, &mut server).expect("handshake");
        assert!(server.peer_certificates().is_some());
    }

    #[test]
    fn test_server_rejects_unexpected_client() {
        let f = fixture();
        let client_cfg = client_config(&f.device, f.authenticator.clone()).expect("client config");
        let server_cfg =
            server_config(&f.broker, f.authenticator.clone(), Some("device-02")).expect("server config");

        let mut client = ClientConnection::new(
            Arc::new(client_cfg),
            ServerName::try_from("broker").expect("server name"),
        )
        .expect("client connection");
        let mut server = ServerConnection::new(Arc::new(server_cfg)).expect("server connection");

        assert!(handshake(&mut client, &mut server).is_err());
    }

    #[test]
    fn test_public_only_bundle_is_refused() {
        let f = fixture();
        let err = client_config(&f.device.public_only(), f.authenticator).unwrap_err();
        assert!(matches!(
            err,
            PkiError::Store(StoreError::MissingPrivateKey(_))
        ));
    }
}
