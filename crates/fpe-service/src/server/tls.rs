//! TLS termination with rustls.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use rustls::ServerConfig;

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// The ring provider is selected explicitly so the config does not depend on
/// a process-wide default provider being installed.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in PEM data");
    }

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .context("failed to read TLS private key")?
        .context("no private key found in PEM data")?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .context("failed to select TLS protocol versions")?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("failed to build rustls ServerConfig")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Read the PEM pair from disk and build the server config.
pub async fn load(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let cert = tokio::fs::read(cert_path)
        .await
        .with_context(|| format!("failed to read {}", cert_path.display()))?;
    let key = tokio::fs::read(key_path)
        .await
        .with_context(|| format!("failed to read {}", key_path.display()))?;
    build_server_config(&cert, &key)
}
