mod common;

use std::time::Duration;

use common::*;
use webauth_server::webauthn::policy::{
    AttestationConveyancePreference, CoseAlgorithm, RpPolicy, UserVerificationRequirement,
};
use webauth_server::webauthn::{CeremonyError, CredentialStore, VerifyError};

fn attestation_failure(result: Result<impl std::fmt::Debug, CeremonyError>) -> VerifyError {
    match result {
        Err(CeremonyError::AttestationVerificationFailed(reason)) => reason,
        other => panic!("expected attestation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn registers_packed_self_attestation() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let authenticator = SoftAuthenticator::p256(0x11);

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let json = serde_json::to_value(&options).unwrap();
    assert_eq!(json["publicKey"]["rp"]["id"], RP_ID);
    assert_eq!(json["publicKey"]["attestation"], "direct");
    assert_eq!(json["publicKey"]["timeout"], 60_000);
    assert_eq!(json["publicKey"]["pubKeyCredParams"][0]["alg"], -7);
    assert_eq!(json["publicKey"]["excludeCredentials"].as_array().unwrap().len(), 0);

    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    let credential = rp
        .finish_registration(&session, &alice, "YubiKey", &response)
        .await
        .unwrap();

    assert_eq!(credential.credential_id, authenticator.credential_id);
    assert_eq!(credential.user_id, alice.id);
    assert_eq!(credential.name, "YubiKey");
    assert_eq!(credential.algorithm, -7);
    assert_eq!(credential.rp_id, RP_ID);
    assert_eq!(credential.origin, ORIGIN);
    assert_eq!(credential.sign_count, 0);
    assert_eq!(credential.attestation_format, "packed");
    assert_eq!(credential.transports(), vec!["usb".to_string()]);

    let stored = rp
        .credentials()
        .find_by_credential_id(&authenticator.credential_id)
        .await
        .unwrap();
    assert_eq!(stored, Some(credential));
}

#[tokio::test]
async fn existing_credentials_are_excluded() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let authenticator = SoftAuthenticator::p256(0x11);

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::None);
    rp.finish_registration(&session, &alice, "key", &response)
        .await
        .unwrap();

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let json = serde_json::to_value(&options).unwrap();
    let excluded = json["publicKey"]["excludeCredentials"].as_array().unwrap();
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0]["id"], base64url(&authenticator.credential_id));
    assert_eq!(excluded[0]["transports"][0], "usb");
}

fn base64url(bytes: &[u8]) -> String {
    webauth_server::webauthn::types::base64url_encode(bytes)
}

#[tokio::test]
async fn ed25519_credentials_register() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let authenticator = SoftAuthenticator::ed25519(0x22);

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    let credential = rp
        .finish_registration(&session, &alice, "ed", &response)
        .await
        .unwrap();
    assert_eq!(credential.algorithm, -8);
}

#[tokio::test]
async fn none_attestation_is_accepted() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::None);
    let credential = rp
        .finish_registration(&session, &alice, "key", &response)
        .await
        .unwrap();
    assert_eq!(credential.attestation_format, "none");
}

#[tokio::test]
async fn certificate_attestations_are_verified() {
    for attestation in [Attestation::PackedX5c, Attestation::FidoU2f] {
        let rp = memory_rp(policy());
        let alice = user("alice");
        let session = session("s1");
        let authenticator = SoftAuthenticator::p256(0x11);

        let options = rp.begin_registration(&session, &alice).await.unwrap();
        let response = authenticator.register(&challenge_of(&options), attestation);
        let credential = rp
            .finish_registration(&session, &alice, "key", &response)
            .await
            .unwrap();
        assert_eq!(credential.attestation_format, attestation.fmt());
        assert_eq!(credential.algorithm, -7);
    }
}

#[tokio::test]
async fn certificate_attestation_signed_by_another_key_is_rejected() {
    for attestation in [Attestation::PackedX5c, Attestation::FidoU2f] {
        let rp = memory_rp(policy());
        let alice = user("alice");
        let session = session("s1");
        let mut authenticator = SoftAuthenticator::p256(0x11);
        authenticator.attestation_key = p256::ecdsa::SigningKey::from_slice(&[0x77; 32]).unwrap();

        let options = rp.begin_registration(&session, &alice).await.unwrap();
        let response = authenticator.register(&challenge_of(&options), attestation);
        let result = rp.finish_registration(&session, &alice, "key", &response).await;
        assert_eq!(attestation_failure(result), VerifyError::BadSignature, "{attestation:?}");
        assert!(rp.credentials().find_by_user(&alice.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn fido_u2f_needs_a_p256_credential() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response =
        SoftAuthenticator::ed25519(0x22).register(&challenge_of(&options), Attestation::FidoU2f);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    assert!(matches!(
        attestation_failure(result),
        VerifyError::MalformedAttestation(_)
    ));
}

#[tokio::test]
async fn credential_type_must_be_public_key() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let mut response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::PackedSelf);
    response.type_ = "password".to_string();
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    assert_eq!(
        attestation_failure(result),
        VerifyError::WrongCredentialType("password".into())
    );
}

#[tokio::test]
async fn wrong_origin_is_rejected_and_nothing_is_stored() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let mut authenticator = SoftAuthenticator::p256(0x11);
    authenticator.origin = "https://evil.example".to_string();

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::OriginMismatch("https://evil.example".into()));

    assert!(rp.credentials().find_by_user(&alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrong_rp_id_is_rejected() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let mut authenticator = SoftAuthenticator::p256(0x11);
    authenticator.rp_id = "evil.example".to_string();

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::RpIdMismatch);
}

#[tokio::test]
async fn challenge_cannot_be_replayed() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let authenticator = SoftAuthenticator::p256(0x11);

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    rp.finish_registration(&session, &alice, "key", &response)
        .await
        .unwrap();

    let replay = rp.finish_registration(&session, &alice, "key", &response).await;
    assert!(matches!(replay, Err(CeremonyError::MissingChallenge)));
}

#[tokio::test]
async fn mismatched_challenge_is_rejected() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");

    rp.begin_registration(&session, &alice).await.unwrap();
    let response = SoftAuthenticator::p256(0x11).register(&[0u8; 32], Attestation::PackedSelf);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::ChallengeMismatch);
}

#[tokio::test]
async fn challenge_is_bound_to_the_user_it_was_issued_for() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let mallory = user("mallory");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::None);
    let result = rp.finish_registration(&session, &mallory, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::ChallengeMismatch);
}

#[tokio::test]
async fn authentication_challenge_cannot_complete_registration() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_authentication(&session, Some(&alice)).await.unwrap();
    let response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::None);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    assert!(matches!(result, Err(CeremonyError::MissingChallenge)));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let bob = user("bob");
    let authenticator = SoftAuthenticator::p256(0x11);

    let options = rp.begin_registration(&session("a"), &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::None);
    rp.finish_registration(&session("a"), &alice, "key", &response)
        .await
        .unwrap();

    let options = rp.begin_registration(&session("b"), &bob).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::None);
    let result = rp.finish_registration(&session("b"), &bob, "key", &response).await;
    assert!(matches!(result, Err(CeremonyError::DuplicateCredential)));

    let stored = rp
        .credentials()
        .find_by_credential_id(&authenticator.credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, alice.id);
}

#[tokio::test]
async fn required_user_verification_rejects_presence_only() {
    let policy = RpPolicy::builder(RP_ID, "Test RP")
        .origin(ORIGIN)
        .user_verification(UserVerificationRequirement::Required)
        .build()
        .unwrap();
    let rp = memory_rp(policy);
    let alice = user("alice");
    let session = session("s1");
    let mut authenticator = SoftAuthenticator::p256(0x11);

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::UserVerificationRequired);

    authenticator.flags = FLAG_UP | FLAG_UV;
    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    rp.finish_registration(&session, &alice, "key", &response)
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_user_presence_is_rejected() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");
    let mut authenticator = SoftAuthenticator::p256(0x11);
    authenticator.flags = 0;

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response = authenticator.register(&challenge_of(&options), Attestation::PackedSelf);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::UserPresenceMissing);
}

#[tokio::test]
async fn algorithm_outside_policy_is_rejected() {
    let policy = RpPolicy::builder(RP_ID, "Test RP")
        .origin(ORIGIN)
        .algorithms(vec![CoseAlgorithm::EdDsa])
        .build()
        .unwrap();
    let rp = memory_rp(policy);
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::PackedSelf);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::UnsupportedAlgorithm(-7));
}

#[tokio::test]
async fn forged_attestation_signature_is_rejected() {
    let rp = memory_rp(policy());
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let challenge = challenge_of(&options);
    // Statement signed by a different key than the one being attested
    let genuine = SoftAuthenticator::p256(0x11).register(&challenge, Attestation::PackedSelf);
    let forger = SoftAuthenticator::p256(0x33).register(&challenge, Attestation::PackedSelf);

    let mut response = genuine.clone();
    let genuine_object = ciborium_map(&genuine.response.attestation_object.0);
    let forged_object = ciborium_map(&forger.response.attestation_object.0);
    let spliced = splice_statement(genuine_object, forged_object);
    response.response.attestation_object.0 = cbor(&spliced);

    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    let reason = attestation_failure(result);
    assert_eq!(reason, VerifyError::BadSignature);
}

fn ciborium_map(bytes: &[u8]) -> ciborium::value::Value {
    ciborium::from_reader(bytes).unwrap()
}

/// Keeps `target`'s authData but takes `source`'s attStmt.
fn splice_statement(
    target: ciborium::value::Value,
    source: ciborium::value::Value,
) -> ciborium::value::Value {
    use ciborium::value::Value;
    let (Value::Map(mut target), Value::Map(source)) = (target, source) else {
        panic!("attestation objects are maps");
    };
    let stmt = source
        .into_iter()
        .find(|(k, _)| k.as_text() == Some("attStmt"))
        .unwrap()
        .1;
    for (k, v) in target.iter_mut() {
        if k.as_text() == Some("attStmt") {
            *v = stmt.clone();
        }
    }
    Value::Map(target)
}

#[tokio::test]
async fn statement_is_not_checked_without_direct_attestation() {
    let policy = RpPolicy::builder(RP_ID, "Test RP")
        .origin(ORIGIN)
        .attestation(AttestationConveyancePreference::None)
        .build()
        .unwrap();
    let rp = memory_rp(policy);
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    let mut response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::PackedSelf);
    let mut object = ciborium_map(&response.response.attestation_object.0);
    if let ciborium::value::Value::Map(entries) = &mut object {
        for (k, v) in entries.iter_mut() {
            if k.as_text() == Some("attStmt") {
                *v = ciborium::value::Value::Map(vec![(
                    ciborium::value::Value::Text("sig".into()),
                    ciborium::value::Value::Bytes(vec![0; 8]),
                )]);
            }
        }
    }
    response.response.attestation_object.0 = cbor(&object);

    rp.finish_registration(&session, &alice, "key", &response)
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_challenge_is_rejected() {
    let policy = RpPolicy::builder(RP_ID, "Test RP")
        .origin(ORIGIN)
        .timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    let rp = memory_rp(policy);
    let alice = user("alice");
    let session = session("s1");

    let options = rp.begin_registration(&session, &alice).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response =
        SoftAuthenticator::p256(0x11).register(&challenge_of(&options), Attestation::None);
    let result = rp.finish_registration(&session, &alice, "key", &response).await;
    assert!(matches!(result, Err(CeremonyError::ChallengeExpired)));
}
