//! [`Pseudonymizer`]: FF1 and envelope operations behind the [`Executable`] seam.

use std::sync::Arc;

use async_trait::async_trait;
use common::protocol::{FpeRequest, FpeResponse, Invocation, InvocationOutput, ENVELOPE_RADIX};
use common::{Operation, Profile, ServiceError};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::Executable;
use crate::crypto::cipher::{self, CipherError, SealedField};
use crate::crypto::ff1::{self, FpeError};
use crate::dek::{DekError, DekManager, MasterKeyError, ResolvedDek, SecretStoreError};

/// Message returned for a body that is not a valid [`FpeRequest`].
pub const INVALID_BODY: &str = "invalid body data in request";

/// Message returned for an operation the active profile does not serve.
pub const UNHANDLED_OPERATION: &str = "unhandled operation";

/// Fixed FF1 key for deployments without a DEK. Wiped on drop.
pub struct StaticKey(Zeroizing<Vec<u8>>);

impl StaticKey {
    /// Accepts AES-128 or AES-256 key lengths.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FpeError> {
        match bytes.len() {
            16 | 32 => Ok(Self(Zeroizing::new(bytes.to_vec()))),
            n => Err(FpeError::InvalidKeyLength(n)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl ZeroizeOnDrop for StaticKey {}

impl std::fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticKey([REDACTED])")
    }
}

/// Where the executable gets key material from.
pub enum KeySource {
    /// Resolve the DEK through the master key and secret store per invocation.
    Dek(DekManager),
    /// Use a fixed key; envelope operations are unavailable.
    Static(StaticKey),
}

/// Immutable process-wide settings, built once at startup.
pub struct ExecutableSettings {
    pub profile: Profile,
    pub tweak: Vec<u8>,
    pub keys: KeySource,
}

enum ActiveKey<'a> {
    Static(&'a StaticKey),
    Dek(ResolvedDek),
}

impl ActiveKey<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            ActiveKey::Static(k) => k.as_bytes(),
            ActiveKey::Dek(d) => d.key.as_bytes(),
        }
    }
}

#[derive(Clone)]
pub struct Pseudonymizer {
    settings: Arc<ExecutableSettings>,
}

impl Pseudonymizer {
    pub fn new(settings: ExecutableSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    async fn run(&self, op: Operation, req: FpeRequest) -> Result<FpeResponse, ServiceError> {
        if !self.settings.profile.operations().contains(&op) {
            return Err(ServiceError::UnhandledOperation(UNHANDLED_OPERATION.into()));
        }
        let tweak = &self.settings.tweak;

        match op {
            Operation::Encrypt => {
                let key = self.active_key(op).await?;
                let ciphertext =
                    ff1::encrypt(&req.input, req.radix, key.bytes(), tweak).map_err(fpe_failure)?;
                Ok(response(op, req.input, ciphertext, radix_field(req.radix)))
            }
            Operation::Decrypt => {
                let key = self.active_key(op).await?;
                let plaintext =
                    ff1::decrypt(&req.input, req.radix, key.bytes(), tweak).map_err(fpe_failure)?;
                Ok(response(op, plaintext, req.input, radix_field(req.radix)))
            }
            Operation::EnvelopeEncrypt => {
                let dek = self.dek(op).await?;
                let sealed = cipher::seal(req.input.as_bytes(), dek.key.as_bytes(), dek.key_id)
                    .map_err(cipher_failure)?;
                Ok(response(op, req.input, sealed.to_string_repr(), ENVELOPE_RADIX))
            }
            Operation::EnvelopeDecrypt => {
                let field = SealedField::parse(req.input.trim()).map_err(cipher_failure)?;
                let dek = self.dek(op).await?;
                let opened =
                    cipher::open(&field, dek.key.as_bytes(), dek.key_id).map_err(cipher_failure)?;
                let plaintext = String::from_utf8(opened).map_err(|_| {
                    ServiceError::EncryptionFailure("sealed payload is not valid UTF-8".into())
                })?;
                Ok(response(op, plaintext, req.input, ENVELOPE_RADIX))
            }
        }
    }

    async fn active_key(&self, op: Operation) -> Result<ActiveKey<'_>, ServiceError> {
        match &self.settings.keys {
            KeySource::Static(k) => Ok(ActiveKey::Static(k)),
            KeySource::Dek(_) => self.dek(op).await.map(ActiveKey::Dek),
        }
    }

    /// Encrypting operations may create the DEK; decrypting ones never do, so
    /// ciphertext under a deleted DEK cannot be silently re-keyed.
    async fn dek(&self, op: Operation) -> Result<ResolvedDek, ServiceError> {
        let KeySource::Dek(manager) = &self.settings.keys else {
            return Err(ServiceError::UnhandledOperation(UNHANDLED_OPERATION.into()));
        };
        let resolved = if op.creates_key() {
            manager.get_or_create().await
        } else {
            manager.resolve_existing().await
        };
        resolved.map_err(|e| dek_failure(&e))
    }
}

#[async_trait]
impl Executable for Pseudonymizer {
    async fn invoke(&self, invocation: Invocation) -> InvocationOutput {
        let invocation_id = Uuid::new_v4();
        let op = invocation.operation;
        let span = info_span!("invoke", invocation_id = %invocation_id, operation = %op);

        async move {
            let result = match serde_json::from_slice::<FpeRequest>(&invocation.body) {
                Ok(req) => self.run(op, req).await,
                Err(_) => Err(ServiceError::BadRequest(INVALID_BODY.into())),
            };
            match result {
                Ok(resp) => {
                    info!(status = 200, "invocation complete");
                    InvocationOutput::json(200, &resp)
                }
                Err(e) => {
                    warn!(status = e.http_status(), code = e.code(), "invocation failed");
                    InvocationOutput::from_error(&e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn response(op: Operation, plaintext: String, ciphertext: String, radix: i32) -> FpeResponse {
    FpeResponse {
        operation: op.label().to_owned(),
        plaintext,
        ciphertext,
        radix,
    }
}

fn radix_field(radix: u32) -> i32 {
    i32::try_from(radix).unwrap_or(i32::MAX)
}

fn fpe_failure(e: FpeError) -> ServiceError {
    match e {
        FpeError::InvalidKeyLength(_) => ServiceError::Internal(e.to_string()),
        _ => ServiceError::BadRequest(e.to_string()),
    }
}

fn cipher_failure(e: CipherError) -> ServiceError {
    match e {
        CipherError::InvalidFormat => ServiceError::BadRequest(e.to_string()),
        CipherError::KeyMismatch | CipherError::AeadFailure => {
            ServiceError::EncryptionFailure(e.to_string())
        }
        CipherError::InvalidKeyLength => ServiceError::Internal(e.to_string()),
    }
}

/// Backend failures are logged in full; callers only see a fixed message.
pub(crate) fn dek_failure(e: &DekError) -> ServiceError {
    if e.is_permission_denied() {
        return ServiceError::PermissionDenied(e.to_string());
    }
    match e {
        DekError::NotFound(_) => ServiceError::EncryptionFailure(e.to_string()),
        DekError::Contended { .. }
        | DekError::SecretStore(SecretStoreError::Backend(_))
        | DekError::MasterKey(MasterKeyError::Backend(_)) => {
            warn!(error = %e, "key backend unavailable");
            ServiceError::Unavailable(KEY_BACKEND_UNAVAILABLE.into())
        }
        _ => {
            error!(error = %e, "data encryption key unusable");
            ServiceError::Internal(KEY_UNUSABLE.into())
        }
    }
}

const KEY_BACKEND_UNAVAILABLE: &str = "key backend unavailable, retry later";
const KEY_UNUSABLE: &str = "data encryption key could not be loaded";

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use common::protocol::ErrorResponse;
    use serde_json::json;

    use super::*;
    use crate::testutil;

    fn call(op: Operation, body: serde_json::Value) -> Invocation {
        Invocation {
            operation: op,
            body: Bytes::from(body.to_string()),
        }
    }

    fn ok_body(out: &InvocationOutput) -> FpeResponse {
        assert_eq!(out.status, 200, "body: {:?}", out.body);
        serde_json::from_slice(&out.body).unwrap()
    }

    fn err_body(out: &InvocationOutput) -> ErrorResponse {
        serde_json::from_slice(&out.body).unwrap()
    }

    #[tokio::test]
    async fn ff1_round_trip_preserves_format() {
        let (exe, _) = testutil::full_pseudonymizer();
        let enc = ok_body(&exe.invoke(call(Operation::Encrypt, json!({"input": "123456789"}))).await);
        assert_eq!(enc.operation, "Encrypt");
        assert_eq!(enc.radix, 10);
        assert_eq!(enc.ciphertext.len(), 9);
        assert!(enc.ciphertext.chars().all(|c| c.is_ascii_digit()));

        let dec = ok_body(
            &exe.invoke(call(Operation::Decrypt, json!({"input": enc.ciphertext})))
                .await,
        );
        assert_eq!(dec.operation, "Decrypt");
        assert_eq!(dec.plaintext, "123456789");
    }

    #[tokio::test]
    async fn envelope_round_trip() {
        let (exe, _) = testutil::full_pseudonymizer();
        let enc = ok_body(
            &exe.invoke(call(Operation::EnvelopeEncrypt, json!({"input": "Jane Doe <jane@example.com>"})))
                .await,
        );
        assert_eq!(enc.operation, "Envelope-Encrypt");
        assert_eq!(enc.radix, ENVELOPE_RADIX);
        assert!(enc.ciphertext.starts_with("v1."));

        let dec = ok_body(
            &exe.invoke(call(Operation::EnvelopeDecrypt, json!({"input": enc.ciphertext})))
                .await,
        );
        assert_eq!(dec.operation, "Envelope-Decrypt");
        assert_eq!(dec.plaintext, "Jane Doe <jane@example.com>");
    }

    #[tokio::test]
    async fn envelope_decrypt_after_dek_deletion_fails_but_encrypt_recreates() {
        let (exe, manager) = testutil::full_pseudonymizer();
        let enc = ok_body(
            &exe.invoke(call(Operation::EnvelopeEncrypt, json!({"input": "4111111111111111"})))
                .await,
        );
        assert!(manager.destroy().await.unwrap());

        let out = exe
            .invoke(call(Operation::EnvelopeDecrypt, json!({"input": enc.ciphertext.clone()})))
            .await;
        assert_eq!(out.status, 500);
        assert_eq!(err_body(&out).code, "encryption_failure");

        // A fresh encrypt creates a new DEK; old ciphertext stays unrecoverable.
        let fresh = exe
            .invoke(call(Operation::EnvelopeEncrypt, json!({"input": "4111111111111111"})))
            .await;
        assert_eq!(fresh.status, 200);
        let stale = exe
            .invoke(call(Operation::EnvelopeDecrypt, json!({"input": enc.ciphertext})))
            .await;
        assert_eq!(stale.status, 500);
        assert!(err_body(&stale).message.contains("different data encryption key"));
    }

    #[tokio::test]
    async fn decrypt_before_any_encrypt_does_not_create_a_dek() {
        let (exe, manager) = testutil::full_pseudonymizer();
        let out = exe
            .invoke(call(Operation::Decrypt, json!({"input": "123456789"})))
            .await;
        assert_eq!(out.status, 500);
        assert!(manager.resolve_existing().await.is_err());
    }

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let (exe, _) = testutil::full_pseudonymizer();
        let out = exe
            .invoke(Invocation {
                operation: Operation::Encrypt,
                body: Bytes::from_static(b"{not json"),
            })
            .await;
        assert_eq!(out.status, 400);
        let body = err_body(&out);
        assert_eq!(body.code, "bad_request");
        assert_eq!(body.message, INVALID_BODY);
    }

    #[tokio::test]
    async fn numeral_outside_radix_is_bad_request() {
        let (exe, _) = testutil::full_pseudonymizer();
        let out = exe
            .invoke(call(Operation::Encrypt, json!({"input": "12ab56789", "radix": 10})))
            .await;
        assert_eq!(out.status, 400);
    }

    #[tokio::test]
    async fn malformed_sealed_value_is_bad_request() {
        let (exe, _) = testutil::full_pseudonymizer();
        let out = exe
            .invoke(call(Operation::EnvelopeDecrypt, json!({"input": "not-sealed"})))
            .await;
        assert_eq!(out.status, 400);
    }

    #[tokio::test]
    async fn minimal_profile_uses_static_key_and_rejects_envelope_ops() {
        let exe = testutil::minimal_pseudonymizer();
        let enc = ok_body(&exe.invoke(call(Operation::Encrypt, json!({"input": "123456789"}))).await);
        let dec = ok_body(
            &exe.invoke(call(Operation::Decrypt, json!({"input": enc.ciphertext})))
                .await,
        );
        assert_eq!(dec.plaintext, "123456789");

        let out = exe
            .invoke(call(Operation::EnvelopeEncrypt, json!({"input": "x"})))
            .await;
        assert_eq!(out.status, 405);
        assert_eq!(err_body(&out).message, UNHANDLED_OPERATION);
    }

    #[tokio::test]
    async fn static_key_is_deterministic_for_fixed_tweak() {
        let a = testutil::minimal_pseudonymizer();
        let b = testutil::minimal_pseudonymizer();
        let body = json!({"input": "123456789"});
        let ca = ok_body(&a.invoke(call(Operation::Encrypt, body.clone())).await).ciphertext;
        let cb = ok_body(&b.invoke(call(Operation::Encrypt, body)).await).ciphertext;
        assert_eq!(ca, cb);
    }

    #[test]
    fn static_key_rejects_odd_lengths() {
        assert!(StaticKey::from_slice(&[0u8; 16]).is_ok());
        assert!(StaticKey::from_slice(&[0u8; 32]).is_ok());
        assert!(matches!(
            StaticKey::from_slice(&[0u8; 24]),
            Err(FpeError::InvalidKeyLength(24))
        ));
    }

    #[test]
    fn dek_errors_map_to_service_errors() {
        let denied = DekError::SecretStore(SecretStoreError::PermissionDenied("/secret/fpe/dek".into()));
        assert_eq!(dek_failure(&denied).http_status(), 500);
        assert_eq!(dek_failure(&denied).code(), "permission_denied");

        let contended = DekError::Contended {
            name: "/secret/fpe/dek".into(),
            attempts: 3,
        };
        assert_eq!(dek_failure(&contended).http_status(), 503);

        let missing = DekError::NotFound("/secret/fpe/dek".into());
        assert_eq!(dek_failure(&missing).code(), "encryption_failure");
    }

    #[test]
    fn backend_detail_stays_out_of_error_messages() {
        let detail = "request id 7f3c, endpoint https://kms.internal:443, dispatch failure";
        let cases = [
            DekError::SecretStore(SecretStoreError::Backend(detail.into())),
            DekError::MasterKey(MasterKeyError::Backend(detail.into())),
            DekError::MalformedSecret(detail.into()),
        ];
        for e in &cases {
            let svc = dek_failure(e);
            assert!(!svc.to_string().contains("7f3c"), "{svc}");
            assert!(!svc.to_string().contains("kms.internal"), "{svc}");
        }
        assert_eq!(dek_failure(&cases[0]).http_status(), 503);
        assert_eq!(dek_failure(&cases[2]).http_status(), 500);
    }
}
