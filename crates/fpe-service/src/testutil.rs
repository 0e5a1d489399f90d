//! Fixtures shared by unit tests across modules.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::Profile;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::{Authorizer, KeySetCache, TrustPolicy, TrustedKeySet};
use crate::dek::{DekManager, InMemorySecretStore, LocalMasterKey};
use crate::executable::{ExecutableSettings, KeySource, Pseudonymizer, StaticKey};

pub const ISSUER: &str = "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_test";
pub const CLIENT_ID: &str = "fpe-test-client";
pub const KID: &str = "test-key-1";
pub const TWEAK: [u8; 8] = [0xD8, 0xE7, 0x92, 0x0A, 0xFA, 0x33, 0x0A, 0x73];
pub const STATIC_KEY: [u8; 16] = [
    0xEF, 0x43, 0x59, 0xD8, 0xD5, 0x80, 0xAA, 0x4F, 0x7F, 0x03, 0x6D, 0x6F, 0x04, 0xFC, 0x6A, 0x94,
];

const SEED: [u8; 32] = [7u8; 32];

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Ed25519 private key in PKCS#8 DER, as `EncodingKey::from_ed_der` expects.
pub fn pkcs8_from_seed(seed: [u8; 32]) -> Vec<u8> {
    let mut der = vec![
        0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04,
        0x20,
    ];
    der.extend_from_slice(&seed);
    der
}

pub fn signing_der() -> Vec<u8> {
    pkcs8_from_seed(SEED)
}

pub fn jwk_ed25519() -> Value {
    let public = SigningKey::from_bytes(&SEED).verifying_key().to_bytes();
    json!({
        "kty": "OKP",
        "crv": "Ed25519",
        "use": "sig",
        "alg": "EdDSA",
        "kid": KID,
        "x": URL_SAFE_NO_PAD.encode(public),
    })
}

pub fn jwks_json() -> Value {
    json!({ "keys": [jwk_ed25519()] })
}

pub fn trusted_keys() -> TrustedKeySet {
    TrustedKeySet::from_json(jwks_json().to_string().as_bytes()).unwrap()
}

pub fn policy() -> TrustPolicy {
    TrustPolicy::new(ISSUER, [CLIENT_ID.to_owned()])
}

pub fn authorizer() -> Authorizer {
    Authorizer::new(policy(), KeySetCache::new(trusted_keys()))
}

/// Claims of a valid access token for [`CLIENT_ID`].
pub fn access_claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": "user-1",
        "token_use": "access",
        "client_id": CLIENT_ID,
        "scope": "aws.cognito.signin.user.admin",
        "iat": now(),
        "exp": now() + 3600,
    })
}

/// Sign `claims` with the trusted test key.
pub fn mint(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(KID.into());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_ed_der(&signing_der())).unwrap()
}

pub fn bearer() -> String {
    format!("Bearer {}", mint(&access_claims()))
}

pub fn dek_manager() -> DekManager {
    let master = LocalMasterKey::generate("local/fpe-master-key");
    DekManager::new(
        Arc::new(master),
        Arc::new(InMemorySecretStore::new()),
        "local/fpe-master-key",
        "/secret/fpe/dek",
    )
}

pub fn full_pseudonymizer() -> (Pseudonymizer, DekManager) {
    let manager = dek_manager();
    let exe = Pseudonymizer::new(ExecutableSettings {
        profile: Profile::Full,
        tweak: TWEAK.to_vec(),
        keys: KeySource::Dek(manager.clone()),
    });
    (exe, manager)
}

pub fn minimal_pseudonymizer() -> Pseudonymizer {
    Pseudonymizer::new(ExecutableSettings {
        profile: Profile::Minimal,
        tweak: TWEAK.to_vec(),
        keys: KeySource::Static(StaticKey::from_slice(&STATIC_KEY).unwrap()),
    })
}
