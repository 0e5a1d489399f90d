//! Trusted signing keys, loaded from a JWKS document.
//!
//! The set is cached behind [`ArcSwap`] so the authorization hot path never
//! blocks, and a background task swaps in a fresh set on a fixed interval.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use thiserror::Error;
use tokio::time;
use tracing::{info, warn};

/// Errors from loading a key set.
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("failed to fetch JWKS from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to read JWKS file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JWKS document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("JWKS document contains no usable signing keys")]
    Empty,
}

/// One verification key with the only algorithm it may be used with.
#[derive(Clone)]
pub struct TrustedKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// `kid` → verification key.
#[derive(Clone, Default)]
pub struct TrustedKeySet {
    keys: HashMap<String, TrustedKey>,
}

impl TrustedKeySet {
    /// Build from a parsed JWKS. RSA keys are bound to RS256 and Ed25519 keys
    /// to EdDSA; keys without a `kid` or of any other type are skipped.
    pub fn from_jwks(set: &JwkSet) -> Self {
        let mut keys = HashMap::new();
        for jwk in &set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                warn!("skipping JWK without kid");
                continue;
            };
            let algorithm = match &jwk.algorithm {
                AlgorithmParameters::RSA(_) => Algorithm::RS256,
                AlgorithmParameters::OctetKeyPair(p) if matches!(p.curve, EllipticCurve::Ed25519) => {
                    Algorithm::EdDSA
                }
                _ => {
                    warn!(kid = %kid, "skipping JWK with unsupported key type");
                    continue;
                }
            };
            // A key that advertises a different algorithm is not usable under ours.
            if let Some(declared) = &jwk.common.key_algorithm {
                let matches = matches!(
                    (declared, algorithm),
                    (KeyAlgorithm::RS256, Algorithm::RS256) | (KeyAlgorithm::EdDSA, Algorithm::EdDSA)
                );
                if !matches {
                    warn!(kid = %kid, declared = ?declared, "skipping JWK with unsupported alg");
                    continue;
                }
            }
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(kid, TrustedKey { key, algorithm });
                }
                Err(e) => warn!(kid = %kid, error = %e, "skipping unparseable JWK"),
            }
        }
        Self { keys }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, KeySetError> {
        let set: JwkSet = serde_json::from_slice(bytes)?;
        Ok(Self::from_jwks(&set))
    }

    pub fn get(&self, kid: &str) -> Option<&TrustedKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for TrustedKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustedKeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Where the identity provider publishes its signing keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwksSource {
    Url(String),
    File(PathBuf),
}

impl JwksSource {
    /// Fetch and parse the key set. An empty result is an error.
    pub async fn load(&self, http: &reqwest::Client) -> Result<TrustedKeySet, KeySetError> {
        let body = match self {
            JwksSource::Url(url) => {
                let fetch_err = |e: reqwest::Error| KeySetError::Fetch {
                    url: url.clone(),
                    reason: e.to_string(),
                };
                http.get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(fetch_err)?
                    .bytes()
                    .await
                    .map_err(fetch_err)?
                    .to_vec()
            }
            JwksSource::File(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| KeySetError::Read {
                        path: path.clone(),
                        source,
                    })?
            }
        };
        let set = TrustedKeySet::from_json(&body)?;
        if set.is_empty() {
            return Err(KeySetError::Empty);
        }
        Ok(set)
    }
}

/// Shared, lock-free holder of the current [`TrustedKeySet`].
#[derive(Clone, Debug)]
pub struct KeySetCache {
    inner: Arc<ArcSwap<TrustedKeySet>>,
}

impl KeySetCache {
    pub fn new(initial: TrustedKeySet) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    pub fn load(&self) -> Arc<TrustedKeySet> {
        self.inner.load_full()
    }

    pub fn replace(&self, set: TrustedKeySet) {
        self.inner.store(Arc::new(set));
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }
}

/// Spawn a background task that periodically reloads the key set.
///
/// The first reload fires after one full interval; the startup load is
/// assumed to have populated the cache. On failure the previous set is kept.
pub fn refresh_task(
    cache: KeySetCache,
    source: JwksSource,
    http: reqwest::Client,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match source.load(&http).await {
                Ok(set) => {
                    info!(keys = set.len(), "signing keys refreshed");
                    cache.replace(set);
                }
                Err(e) => warn!(error = %e, "signing key refresh failed; retaining previous set"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testutil;

    #[test]
    fn ed25519_and_rsa_keys_are_trusted() {
        let doc = json!({
            "keys": [
                testutil::jwk_ed25519(),
                {"kty": "RSA", "kid": "rsa-1", "alg": "RS256", "use": "sig", "n": "AQAB", "e": "AQAB"}
            ]
        });
        let set = TrustedKeySet::from_json(doc.to_string().as_bytes()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(testutil::KID).unwrap().algorithm, Algorithm::EdDSA);
        assert_eq!(set.get("rsa-1").unwrap().algorithm, Algorithm::RS256);
    }

    #[test]
    fn symmetric_and_kidless_keys_are_skipped() {
        let doc = json!({
            "keys": [
                {"kty": "oct", "kid": "hmac", "k": "c2VjcmV0"},
                {"kty": "OKP", "crv": "Ed25519", "x": testutil::jwk_ed25519()["x"]}
            ]
        });
        let set = TrustedKeySet::from_json(doc.to_string().as_bytes()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn garbage_document_is_a_parse_error() {
        assert!(matches!(
            TrustedKeySet::from_json(b"not json"),
            Err(KeySetError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn file_source_loads_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwks.json");
        std::fs::write(&path, testutil::jwks_json().to_string()).unwrap();

        let set = JwksSource::File(path).load(&reqwest::Client::new()).await.unwrap();
        assert!(set.get(testutil::KID).is_some());
    }

    #[tokio::test]
    async fn empty_file_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwks.json");
        std::fs::write(&path, r#"{"keys":[]}"#).unwrap();

        let err = JwksSource::File(path).load(&reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, KeySetError::Empty));
    }

    #[test]
    fn cache_replace_is_visible_to_readers() {
        let cache = KeySetCache::new(TrustedKeySet::default());
        let reader = cache.clone();
        assert_eq!(reader.len(), 0);
        cache.replace(testutil::trusted_keys());
        assert_eq!(reader.len(), 1);
    }
}
