//! AWS-backed implementations of the key hierarchy seams.
//!
//! - [`KmsMasterKey`] implements [`MasterKeyManager`](crate::dek::MasterKeyManager)
//!   on top of KMS `GenerateDataKey` / `Decrypt`.
//! - [`SecretsManagerStore`] implements [`SecretStore`](crate::dek::SecretStore)
//!   on top of Secrets Manager, whose create-uniqueness arbitrates DEK creation.

pub mod clients;
pub mod kms;
pub mod secretsmanager;

pub use clients::AwsClients;
pub use kms::KmsMasterKey;
pub use secretsmanager::SecretsManagerStore;

use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata};
use tracing::warn;

/// Error code AWS returns for a missing IAM grant.
pub(crate) const ACCESS_DENIED: &str = "AccessDeniedException";

/// Logs the full source chain and returns the error code with a summary
/// safe to hand back to callers. Request ids, endpoints and SDK internals
/// stay in the log.
pub(crate) fn describe<E>(err: &E, operation: &str) -> (Option<String>, String)
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let code = err.code().map(str::to_owned);
    warn!(
        operation,
        code = code.as_deref().unwrap_or("unknown"),
        error = %DisplayErrorContext(err),
        "AWS call failed"
    );
    let summary = summarize(operation, code.as_deref());
    (code, summary)
}

fn summarize(operation: &str, code: Option<&str>) -> String {
    match code {
        Some(code) => format!("{operation} failed ({code})"),
        None => format!("{operation} failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_carries_only_operation_and_code() {
        assert_eq!(
            summarize("kms:Decrypt", Some("KMSInternalException")),
            "kms:Decrypt failed (KMSInternalException)"
        );
        assert_eq!(
            summarize("secretsmanager:GetSecretValue", None),
            "secretsmanager:GetSecretValue failed"
        );
    }
}
