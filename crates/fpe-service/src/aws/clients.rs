//! AWS SDK client bundle.

use aws_config::BehaviorVersion;

/// KMS and Secrets Manager clients sharing one [`aws_config::SdkConfig`], so
/// credentials are resolved once and reused.
#[derive(Clone, Debug)]
pub struct AwsClients {
    /// Wraps and unwraps the DEK under the master key.
    pub kms: aws_sdk_kms::Client,
    /// Persists the wrapped DEK.
    pub secretsmanager: aws_sdk_secretsmanager::Client,
}

impl AwsClients {
    /// Load the default credential and region chain and build both clients.
    ///
    /// Endpoint overrides (`AWS_ENDPOINT_URL`, `AWS_ENDPOINT_URL_KMS`, ...) are
    /// honoured by the SDK itself.
    pub async fn init() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            kms: aws_sdk_kms::Client::new(&config),
            secretsmanager: aws_sdk_secretsmanager::Client::new(&config),
        }
    }
}
