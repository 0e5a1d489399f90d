//! Configuration loading and validation for the pseudonymization service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::path::PathBuf;

use anyhow::{Context, Result};
use common::Profile;
use serde::Deserialize;

use crate::auth::{JwksSource, TrustPolicy};

/// Master key id used by the local backend when no ARN is configured.
pub const LOCAL_MASTER_KEY_ID: &str = "local/fpe-master-key";

/// Where the master key and the DEK secret live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyBackend {
    /// KMS and Secrets Manager.
    #[default]
    Aws,
    /// In-process master key and secret store. Keys do not survive a restart.
    Local,
}

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `full` (four gated routes, DEK) or `minimal` (two open FF1 routes).
    #[serde(default, rename = "fpe_profile")]
    pub profile: Profile,

    #[serde(default, rename = "fpe_key_backend")]
    pub key_backend: KeyBackend,

    /// Master key ARN. **Required** for the full profile on the `aws` backend.
    #[serde(default)]
    pub fpe_master_key_arn: Option<String>,

    /// Logical name of the DEK secret.
    #[serde(default = "default_dek_secret_name")]
    pub fpe_dek_secret_name: String,

    /// Hex-encoded FF1 tweak. **Required.**
    pub fpe_tweak: String,

    /// Hex-encoded AES key for the minimal profile (16 or 32 bytes).
    #[serde(default)]
    pub fpe_static_key: Option<String>,

    /// Expected `iss` claim. **Required** for the full profile.
    #[serde(default)]
    pub auth_issuer: Option<String>,

    /// Comma-separated list of trusted app client ids.
    #[serde(default)]
    pub auth_client_ids: Option<String>,

    #[serde(default)]
    pub auth_jwks_url: Option<String>,

    #[serde(default)]
    pub auth_jwks_path: Option<PathBuf>,

    /// How often (seconds) to refresh the signing key set.
    #[serde(default = "default_jwks_refresh_interval")]
    pub auth_jwks_refresh_interval_secs: u64,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// PEM certificate chain; TLS is enabled when this and the key are set.
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,

    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,

    /// OTLP collector endpoint. Spans are only exported when this is set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_dek_secret_name() -> String {
    "/secret/fpe/dek".into()
}
fn default_jwks_refresh_interval() -> u64 {
    3600
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.fpe_tweak, "FPE_TWEAK")?;
        self.tweak_bytes()?;
        ensure_non_empty(&self.fpe_dek_secret_name, "FPE_DEK_SECRET_NAME")?;

        match self.profile {
            Profile::Minimal => {
                let key = self
                    .fpe_static_key
                    .as_deref()
                    .context("FPE_STATIC_KEY is required for the minimal profile")?;
                let bytes = hex::decode(key.trim()).context("FPE_STATIC_KEY must be hex")?;
                if !matches!(bytes.len(), 16 | 32) {
                    anyhow::bail!("FPE_STATIC_KEY must be 16 or 32 bytes, got {}", bytes.len());
                }
            }
            Profile::Full => {
                if self.key_backend == KeyBackend::Aws {
                    ensure_present(&self.fpe_master_key_arn, "FPE_MASTER_KEY_ARN")?;
                }
                ensure_present(&self.auth_issuer, "AUTH_ISSUER")?;
                if self.client_ids().is_empty() {
                    anyhow::bail!("AUTH_CLIENT_IDS must list at least one client id");
                }
                self.jwks_source()?;
                if self.auth_jwks_refresh_interval_secs == 0 {
                    anyhow::bail!("AUTH_JWKS_REFRESH_INTERVAL_SECS must be > 0");
                }
            }
        }

        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together");
        }
        Ok(())
    }

    pub fn tweak_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(self.fpe_tweak.trim()).context("FPE_TWEAK must be hex")
    }

    pub fn static_key_bytes(&self) -> Result<Vec<u8>> {
        let key = self
            .fpe_static_key
            .as_deref()
            .context("FPE_STATIC_KEY is not set")?;
        hex::decode(key.trim()).context("FPE_STATIC_KEY must be hex")
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.auth_client_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn trust_policy(&self) -> Result<TrustPolicy> {
        let issuer = self.auth_issuer.clone().context("AUTH_ISSUER is not set")?;
        Ok(TrustPolicy::new(issuer, self.client_ids()))
    }

    /// Exactly one of `AUTH_JWKS_URL` / `AUTH_JWKS_PATH`.
    pub fn jwks_source(&self) -> Result<JwksSource> {
        match (&self.auth_jwks_url, &self.auth_jwks_path) {
            (Some(url), None) if !url.trim().is_empty() => Ok(JwksSource::Url(url.trim().to_owned())),
            (None, Some(path)) => Ok(JwksSource::File(path.clone())),
            (Some(_), Some(_)) => anyhow::bail!("set only one of AUTH_JWKS_URL and AUTH_JWKS_PATH"),
            _ => anyhow::bail!("AUTH_JWKS_URL or AUTH_JWKS_PATH is required for the full profile"),
        }
    }

    /// Master key reference for the active backend.
    pub fn master_key_id(&self) -> String {
        self.fpe_master_key_arn
            .clone()
            .unwrap_or_else(|| LOCAL_MASTER_KEY_ID.into())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

fn ensure_present(value: &Option<String>, name: &str) -> Result<()> {
    ensure_non_empty(value.as_deref().unwrap_or_default(), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Config {
        Config {
            profile: Profile::Full,
            key_backend: KeyBackend::Aws,
            fpe_master_key_arn: Some("arn:aws:kms:eu-west-1:111122223333:key/abc".into()),
            fpe_dek_secret_name: default_dek_secret_name(),
            fpe_tweak: "D8E7920AFA330A73".into(),
            fpe_static_key: None,
            auth_issuer: Some("https://cognito-idp.eu-west-1.amazonaws.com/pool".into()),
            auth_client_ids: Some("client-a, client-b,".into()),
            auth_jwks_url: Some("https://cognito-idp.eu-west-1.amazonaws.com/pool/.well-known/jwks.json".into()),
            auth_jwks_path: None,
            auth_jwks_refresh_interval_secs: default_jwks_refresh_interval(),
            listen_port: default_listen_port(),
            tls_cert_path: None,
            tls_key_path: None,
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }

    fn minimal() -> Config {
        Config {
            profile: Profile::Minimal,
            fpe_master_key_arn: None,
            fpe_static_key: Some("EF4359D8D580AA4F7F036D6F04FC6A94".into()),
            auth_issuer: None,
            auth_client_ids: None,
            auth_jwks_url: None,
            ..full()
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_dek_secret_name(), "/secret/fpe/dek");
        assert_eq!(default_jwks_refresh_interval(), 3600);
        assert_eq!(default_listen_port(), 8080);
        assert_eq!(default_log_level(), "info");
        assert_eq!(Profile::default(), Profile::Full);
        assert_eq!(KeyBackend::default(), KeyBackend::Aws);
    }

    #[test]
    fn full_profile_validates() {
        let cfg = full();
        cfg.validate().unwrap();
        assert_eq!(cfg.client_ids(), vec!["client-a", "client-b"]);
        assert_eq!(cfg.tweak_bytes().unwrap().len(), 8);
    }

    #[test]
    fn minimal_profile_validates_without_auth() {
        minimal().validate().unwrap();
    }

    #[test]
    fn validate_rejects_empty_tweak() {
        let cfg = Config {
            fpe_tweak: " ".into(),
            ..full()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_hex_tweak() {
        let cfg = Config {
            fpe_tweak: "not-hex".into(),
            ..full()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn full_aws_requires_master_key() {
        let cfg = Config {
            fpe_master_key_arn: None,
            ..full()
        };
        assert!(cfg.validate().is_err());

        let local = Config {
            fpe_master_key_arn: None,
            key_backend: KeyBackend::Local,
            ..full()
        };
        local.validate().unwrap();
        assert_eq!(local.master_key_id(), "local/fpe-master-key");
    }

    #[test]
    fn full_requires_exactly_one_jwks_source() {
        let none = Config {
            auth_jwks_url: None,
            ..full()
        };
        assert!(none.validate().is_err());

        let both = Config {
            auth_jwks_path: Some("/etc/fpe/jwks.json".into()),
            ..full()
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn full_requires_client_ids() {
        let cfg = Config {
            auth_client_ids: Some(" , ".into()),
            ..full()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn minimal_rejects_bad_static_key() {
        let cfg = Config {
            fpe_static_key: Some("abcd".into()),
            ..minimal()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tls_paths_come_in_pairs() {
        let cfg = Config {
            tls_cert_path: Some("/run/tls/tls.crt".into()),
            ..full()
        };
        assert!(cfg.validate().is_err());
    }
}
