//! Shared fixtures for integration tests

#![allow(dead_code)]

use cryypt_pki::{
    CertificateBuilder, CertificateBundle, IssuerRef, KeyAlgorithm, KeyMaterial, KeyPair,
    RequestBuilder,
};

pub fn key() -> KeyPair {
    KeyMaterial::default()
        .generate(KeyAlgorithm::EcP256)
        .expect("EC key generation")
}

/// Root -> intermediate -> `device-01` leaf
pub struct ThreeLevel {
    pub builder: CertificateBuilder,
    pub root: CertificateBundle,
    pub intermediate: CertificateBundle,
    pub leaf: CertificateBundle,
}

pub fn three_level() -> ThreeLevel {
    let builder = CertificateBuilder::new();
    let root = builder
        .issue(
            RequestBuilder::root_ca("Fleet Root CA", key())
                .organization("Example Fleet")
                .country("DE")
                .build(),
            IssuerRef::SelfSigned,
        )
        .expect("root issuance");
    let intermediate = builder
        .issue(
            RequestBuilder::intermediate_ca("Fleet Devices CA", key()).build(),
            IssuerRef::from_bundle(&root).expect("root key"),
        )
        .expect("intermediate issuance");
    let leaf = builder
        .issue(
            RequestBuilder::device("device-01", key()).build(),
            IssuerRef::from_bundle(&intermediate).expect("intermediate key"),
        )
        .expect("leaf issuance");
    ThreeLevel {
        builder,
        root,
        intermediate,
        leaf,
    }
}
