//! The pure validate-token stage of the gate.

use std::collections::HashSet;

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;

use super::keys::TrustedKeySet;
use super::AuthError;

/// Algorithms a token may be signed with. `none` cannot be expressed by the
/// decoder at all, and symmetric algorithms are never in this list.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[Algorithm::RS256, Algorithm::EdDSA];

/// The issuer and client set a deployment trusts.
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    pub issuer: String,
    pub client_ids: HashSet<String>,
}

impl TrustPolicy {
    pub fn new(issuer: impl Into<String>, client_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            issuer: issuer.into(),
            client_ids: client_ids.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUse {
    Access,
    Id,
}

/// Identity attached to an authorized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub client_id: String,
    pub token_use: TokenUse,
}

#[derive(Debug)]
pub enum AuthorizerDecision {
    Allow(Principal),
    Deny(AuthError),
}

impl AuthorizerDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizerDecision::Allow(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    token_use: Option<String>,
    client_id: Option<String>,
    aud: Option<Audience>,
}

/// Decide whether a request carrying `authorization` may pass.
///
/// Access tokens name their client in `client_id`; id tokens in `aud`.
pub fn authorize(
    authorization: Option<&str>,
    policy: &TrustPolicy,
    keys: &TrustedKeySet,
) -> AuthorizerDecision {
    match verify(authorization, policy, keys) {
        Ok(principal) => AuthorizerDecision::Allow(principal),
        Err(reason) => AuthorizerDecision::Deny(reason),
    }
}

fn verify(
    authorization: Option<&str>,
    policy: &TrustPolicy,
    keys: &TrustedKeySet,
) -> Result<Principal, AuthError> {
    let token = bearer_token(authorization.ok_or(AuthError::MissingHeader)?)?;

    let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    let trusted = header
        .kid
        .as_deref()
        .and_then(|kid| keys.get(kid))
        .ok_or(AuthError::UnknownKey)?;
    if header.alg != trusted.algorithm || !ACCEPTED_ALGORITHMS.contains(&header.alg) {
        return Err(AuthError::DisallowedAlgorithm(format!("{:?}", header.alg)));
    }

    let mut validation = Validation::new(trusted.algorithm);
    validation.set_issuer(&[policy.issuer.as_str()]);
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);
    validation.validate_aud = false;

    let claims = decode::<Claims>(token, &trusted.key, &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?
        .claims;

    let (token_use, client) = match claims.token_use.as_deref() {
        Some("access") => (TokenUse::Access, claims.client_id),
        Some("id") => (
            TokenUse::Id,
            claims.aud.and_then(|aud| match aud {
                Audience::One(a) => Some(a),
                Audience::Many(all) => all.into_iter().find(|a| policy.client_ids.contains(a)),
            }),
        ),
        _ => return Err(AuthError::WrongTokenUse),
    };
    let client_id = client
        .filter(|c| policy.client_ids.contains(c))
        .ok_or(AuthError::UnknownClient)?;

    Ok(Principal {
        subject: claims.sub,
        client_id,
        token_use,
    })
}

fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header.trim().split_once(' ').ok_or(AuthError::NotBearer)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::NotBearer);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;
    use crate::testutil::{self, access_claims, mint, CLIENT_ID, ISSUER, KID};

    fn decide(header: Option<&str>) -> AuthorizerDecision {
        authorize(header, &testutil::policy(), &testutil::trusted_keys())
    }

    fn denied(header: Option<&str>) -> AuthError {
        match decide(header) {
            AuthorizerDecision::Deny(reason) => reason,
            AuthorizerDecision::Allow(p) => panic!("unexpectedly allowed {p:?}"),
        }
    }

    #[test]
    fn valid_access_token_is_allowed() {
        let token = mint(&access_claims());
        match decide(Some(&format!("Bearer {token}"))) {
            AuthorizerDecision::Allow(p) => {
                assert_eq!(p.client_id, CLIENT_ID);
                assert_eq!(p.subject, "user-1");
                assert_eq!(p.token_use, TokenUse::Access);
            }
            AuthorizerDecision::Deny(r) => panic!("denied: {r}"),
        }
    }

    #[test]
    fn valid_id_token_is_allowed_via_aud() {
        let mut claims = access_claims();
        claims["token_use"] = json!("id");
        claims["aud"] = json!(CLIENT_ID);
        claims.as_object_mut().unwrap().remove("client_id");
        let token = mint(&claims);
        assert!(decide(Some(&format!("Bearer {token}"))).is_allowed());
    }

    #[test]
    fn missing_or_non_bearer_header_is_denied() {
        assert_eq!(denied(None), AuthError::MissingHeader);
        assert_eq!(denied(Some("Basic dXNlcjpwYXNz")), AuthError::NotBearer);
        assert_eq!(denied(Some("Bearer ")), AuthError::NotBearer);
        assert!(matches!(
            denied(Some("Bearer not.a.jwt")),
            AuthError::MalformedToken(_)
        ));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let token = mint(&access_claims());
        assert!(decide(Some(&format!("bearer {token}"))).is_allowed());
    }

    #[test]
    fn expired_token_is_denied() {
        let mut claims = access_claims();
        claims["exp"] = json!(testutil::now() - 3600);
        let token = mint(&claims);
        assert!(matches!(
            denied(Some(&format!("Bearer {token}"))),
            AuthError::InvalidToken(_)
        ));
    }

    #[test]
    fn wrong_issuer_is_denied() {
        let mut claims = access_claims();
        claims["iss"] = json!("https://evil.example.com");
        let token = mint(&claims);
        assert!(matches!(
            denied(Some(&format!("Bearer {token}"))),
            AuthError::InvalidToken(_)
        ));
    }

    #[test]
    fn unknown_client_is_denied() {
        let mut claims = access_claims();
        claims["client_id"] = json!("someone-else");
        let token = mint(&claims);
        assert_eq!(denied(Some(&format!("Bearer {token}"))), AuthError::UnknownClient);
    }

    #[test]
    fn refresh_or_missing_token_use_is_denied() {
        let mut claims = access_claims();
        claims["token_use"] = json!("refresh");
        let token = mint(&claims);
        assert_eq!(denied(Some(&format!("Bearer {token}"))), AuthError::WrongTokenUse);
    }

    #[test]
    fn untrusted_signing_key_is_denied() {
        let other = testutil::pkcs8_from_seed([9u8; 32]);
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(KID.into());
        let token = jsonwebtoken::encode(
            &header,
            &access_claims(),
            &EncodingKey::from_ed_der(&other),
        )
        .unwrap();
        assert!(matches!(
            denied(Some(&format!("Bearer {token}"))),
            AuthError::InvalidToken(_)
        ));
    }

    #[test]
    fn unknown_kid_is_denied() {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some("rotated-away".into());
        let token = jsonwebtoken::encode(
            &header,
            &access_claims(),
            &EncodingKey::from_ed_der(&testutil::signing_der()),
        )
        .unwrap();
        assert_eq!(denied(Some(&format!("Bearer {token}"))), AuthError::UnknownKey);
    }

    #[test]
    fn hmac_token_with_trusted_kid_is_denied() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(KID.into());
        let token = jsonwebtoken::encode(
            &header,
            &access_claims(),
            &EncodingKey::from_secret(b"guessable"),
        )
        .unwrap();
        assert!(matches!(
            denied(Some(&format!("Bearer {token}"))),
            AuthError::DisallowedAlgorithm(_)
        ));
    }

    #[test]
    fn alg_none_is_denied() {
        let header = URL_SAFE_NO_PAD.encode(json!({"alg": "none", "kid": KID}).to_string());
        let payload = URL_SAFE_NO_PAD.encode(access_claims().to_string());
        let token = format!("{header}.{payload}.");
        assert!(!decide(Some(&format!("Bearer {token}"))).is_allowed());
    }

    #[test]
    fn issuer_constant_is_used_by_policy() {
        assert_eq!(testutil::policy().issuer, ISSUER);
    }
}
