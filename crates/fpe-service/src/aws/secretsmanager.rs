//! Secrets Manager secret store.

use async_trait::async_trait;
use tracing::debug;

use super::{describe, ACCESS_DENIED};
use crate::dek::{SecretStore, SecretStoreError};

#[derive(Clone, Debug)]
pub struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerStore {
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }
}

fn fallback<E>(err: &E, operation: &str, name: &str) -> SecretStoreError
where
    E: aws_sdk_secretsmanager::error::ProvideErrorMetadata + std::error::Error,
{
    let (code, summary) = describe(err, operation);
    match code.as_deref() {
        Some(ACCESS_DENIED) => SecretStoreError::PermissionDenied(name.to_owned()),
        _ => SecretStoreError::Backend(summary),
    }
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn create(&self, name: &str, value: &str, description: &str) -> Result<(), SecretStoreError> {
        match self
            .client
            .create_secret()
            .name(name)
            .description(description)
            .secret_string(value)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_exists_exception()) =>
            {
                Err(SecretStoreError::AlreadyExists(name.to_owned()))
            }
            Err(e) => Err(fallback(&e, "secretsmanager:CreateSecret", name)),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        match self.client.get_secret_value().secret_id(name).send().await {
            Ok(out) => Ok(out.secret_string().map(str::to_owned)),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(fallback(&e, "secretsmanager:GetSecretValue", name)),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool, SecretStoreError> {
        // No recovery window, so the name is immediately free for a new DEK.
        match self
            .client
            .delete_secret()
            .secret_id(name)
            .force_delete_without_recovery(true)
            .send()
            .await
        {
            Ok(_) => {
                debug!(secret = %name, "secret force-deleted");
                Ok(true)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|s| s.is_resource_not_found_exception()) =>
            {
                Ok(false)
            }
            Err(e) => Err(fallback(&e, "secretsmanager:DeleteSecret", name)),
        }
    }
}
