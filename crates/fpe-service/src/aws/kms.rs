//! KMS master key.

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use tracing::debug;

use super::{describe, ACCESS_DENIED};
use crate::dek::{MasterKeyError, MasterKeyManager};

/// Master key held by KMS. Key material never leaves the service.
#[derive(Clone, Debug)]
pub struct KmsMasterKey {
    client: aws_sdk_kms::Client,
}

impl KmsMasterKey {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

fn classify<E>(err: &E, operation: &str, key_id: &str) -> MasterKeyError
where
    E: aws_sdk_kms::error::ProvideErrorMetadata + std::error::Error,
{
    let (code, summary) = describe(err, operation);
    match code.as_deref() {
        Some(ACCESS_DENIED) => MasterKeyError::PermissionDenied(key_id.to_owned()),
        Some("NotFoundException") => MasterKeyError::NotFound(key_id.to_owned()),
        Some("InvalidCiphertextException" | "IncorrectKeyException") => {
            MasterKeyError::InvalidCiphertext
        }
        _ => MasterKeyError::Backend(summary),
    }
}

#[async_trait]
impl MasterKeyManager for KmsMasterKey {
    async fn generate_wrapped_key(
        &self,
        key_id: &str,
        len: usize,
    ) -> Result<Vec<u8>, MasterKeyError> {
        let bytes = i32::try_from(len)
            .map_err(|_| MasterKeyError::Backend(format!("unsupported data key length {len}")))?;
        let out = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .number_of_bytes(bytes)
            .send()
            .await
            .map_err(|e| classify(&e, "kms:GenerateDataKey", key_id))?;

        // Only the wrapped half is kept; the plaintext half is discarded here
        // and re-derived through `unwrap_key` from whatever blob gets persisted.
        debug!("KMS data key generated");
        out.ciphertext_blob()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| MasterKeyError::Backend("GenerateDataKey returned no ciphertext".into()))
    }

    async fn unwrap_key(&self, key_id: &str, wrapped: &[u8]) -> Result<Vec<u8>, MasterKeyError> {
        let out = self
            .client
            .decrypt()
            .key_id(key_id)
            .ciphertext_blob(Blob::new(wrapped.to_vec()))
            .send()
            .await
            .map_err(|e| classify(&e, "kms:Decrypt", key_id))?;

        out.plaintext()
            .map(|b| b.as_ref().to_vec())
            .ok_or_else(|| MasterKeyError::Backend("Decrypt returned no plaintext".into()))
    }
}
