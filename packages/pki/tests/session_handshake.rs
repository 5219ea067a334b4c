//! Handshake-time decisions through the transport hook

mod common;

use std::sync::Arc;

use common::three_level;
use cryypt_pki::{
    ChainValidator, HandshakeDecision, PolicyHandle, RevocationMode, SecureSessionAuthenticator,
    StaticRevocationList, TrustPolicy,
};

fn presented(pki: &common::ThreeLevel) -> (Vec<u8>, Vec<Vec<u8>>) {
    (
        pki.leaf.certificate().der().to_vec(),
        vec![pki.intermediate.certificate().der().to_vec()],
    )
}

#[tokio::test]
async fn test_hook_accepts_expected_device_only() {
    let pki = three_level();
    let policy = PolicyHandle::new(TrustPolicy::default().with_anchor(pki.root.certificate().clone()));
    let authenticator = SecureSessionAuthenticator::new(policy, ChainValidator::default());
    let (leaf, chain) = presented(&pki);

    let expect_01 = authenticator.handshake_hook(Some("device-01".to_string()));
    let expect_02 = authenticator.handshake_hook(Some("device-02".to_string()));

    assert!(expect_01(&leaf, &chain).is_accept());
    let rejected = expect_02(&leaf, &chain);
    assert!(matches!(rejected, HandshakeDecision::Reject { .. }));
    assert!(rejected.reason().contains("device-02"));
}

#[tokio::test]
async fn test_anchor_added_mid_session_takes_effect() {
    let pki = three_level();
    let policy = PolicyHandle::default();
    let authenticator = SecureSessionAuthenticator::new(policy.clone(), ChainValidator::default());
    let (leaf, chain) = presented(&pki);

    let before = authenticator.authenticate(&leaf, &chain, None).await;
    assert!(!before.is_accept());

    policy.append_anchor(pki.root.certificate().clone());
    let after = authenticator.authenticate(&leaf, &chain, None).await;
    assert!(after.is_accept(), "{after}");
}

#[tokio::test]
async fn test_hard_fail_needs_prefetch_for_sync_decisions() {
    let pki = three_level();
    let policy = PolicyHandle::new(
        TrustPolicy::default()
            .with_anchor(pki.root.certificate().clone())
            .with_revocation_mode(RevocationMode::HardFail),
    );
    let validator =
        ChainValidator::default().with_revocation_checker(Arc::new(StaticRevocationList::new()));
    let authenticator = SecureSessionAuthenticator::new(policy, validator);
    let (leaf, chain) = presented(&pki);

    assert!(!authenticator.decide(&leaf, &chain, Some("device-01")).is_accept());

    let answered = authenticator.prefetch(&leaf, &chain).await.expect("prefetch");
    assert_eq!(answered, 2);
    assert!(authenticator.decide(&leaf, &chain, Some("device-01")).is_accept());
}

#[tokio::test]
async fn test_revoked_device_is_rejected() {
    let pki = three_level();
    let policy = PolicyHandle::new(
        TrustPolicy::default()
            .with_anchor(pki.root.certificate().clone())
            .with_revocation_mode(RevocationMode::SoftFail),
    );
    let revocations = StaticRevocationList::new().revoke(pki.leaf.certificate());
    let authenticator = SecureSessionAuthenticator::new(
        policy,
        ChainValidator::default().with_revocation_checker(Arc::new(revocations)),
    );
    let (leaf, chain) = presented(&pki);

    let decision = authenticator.authenticate(&leaf, &chain, Some("device-01")).await;
    assert!(!decision.is_accept());
    assert!(decision.reason().contains("revoked"));
}
