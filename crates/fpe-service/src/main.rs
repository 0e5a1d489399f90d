//! `fpe-service` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing, optional OTLP).
//! 3. Build the key source: DEK through the master key and secret store, or
//!    the static key of the minimal profile.
//! 4. Freeze [`ExecutableSettings`] and build the [`Pseudonymizer`].
//! 5. Full profile: load the signing key set and spawn its refresh task.
//! 6. Build the Axum router and serve, with TLS when configured.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use common::Profile;
use tracing::info;
use zeroize::Zeroizing;

use fpe_service::auth::{keys, Authorizer, KeySetCache};
use fpe_service::aws::{AwsClients, KmsMasterKey, SecretsManagerStore};
use fpe_service::config::{Config, KeyBackend};
use fpe_service::dek::{DekManager, InMemorySecretStore, LocalMasterKey};
use fpe_service::executable::{ExecutableSettings, KeySource, Pseudonymizer, StaticKey};
use fpe_service::server::{self, state::AppState};
use fpe_service::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = %cfg.profile,
        port = cfg.listen_port,
        "fpe-service starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key source
    // -----------------------------------------------------------------------
    let key_source = match cfg.profile {
        Profile::Minimal => {
            let raw = Zeroizing::new(cfg.static_key_bytes()?);
            KeySource::Static(StaticKey::from_slice(&raw).context("invalid FPE_STATIC_KEY")?)
        }
        Profile::Full => KeySource::Dek(dek_manager(&cfg).await),
    };

    // -----------------------------------------------------------------------
    // 4. Executable
    // -----------------------------------------------------------------------
    let executable = Arc::new(Pseudonymizer::new(ExecutableSettings {
        profile: cfg.profile,
        tweak: cfg.tweak_bytes()?,
        keys: key_source,
    }));

    // -----------------------------------------------------------------------
    // 5. Authorizer
    // -----------------------------------------------------------------------
    let state = match cfg.profile {
        Profile::Minimal => AppState::minimal(executable),
        Profile::Full => {
            let source = cfg.jwks_source()?;
            let http = reqwest::Client::new();
            let initial = source
                .load(&http)
                .await
                .context("failed to load signing keys")?;
            info!(keys = initial.len(), "signing keys loaded");

            let cache = KeySetCache::new(initial);
            let _jwks_refresh = keys::refresh_task(
                cache.clone(),
                source,
                http,
                Duration::from_secs(cfg.auth_jwks_refresh_interval_secs),
            );
            AppState::full(executable, Authorizer::new(cfg.trust_policy()?, cache))
        }
    };

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(state);
    let tls = match (&cfg.tls_cert_path, &cfg.tls_key_path) {
        (Some(cert), Some(key)) => Some(server::tls::load(cert, key).await?),
        _ => None,
    };
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    server::listener::serve(router, addr, tls).await?;

    telemetry::shutdown_telemetry();
    Ok(())
}

async fn dek_manager(cfg: &Config) -> DekManager {
    let master_key_id = cfg.master_key_id();
    match cfg.key_backend {
        KeyBackend::Aws => {
            let aws = AwsClients::init().await;
            DekManager::new(
                Arc::new(KmsMasterKey::new(aws.kms)),
                Arc::new(SecretsManagerStore::new(aws.secretsmanager)),
                master_key_id,
                cfg.fpe_dek_secret_name.clone(),
            )
        }
        KeyBackend::Local => {
            info!("using in-process master key; DEKs do not survive a restart");
            DekManager::new(
                Arc::new(LocalMasterKey::generate(master_key_id.clone())),
                Arc::new(InMemorySecretStore::new()),
                master_key_id,
                cfg.fpe_dek_secret_name.clone(),
            )
        }
    }
}
