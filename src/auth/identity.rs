use anyhow::anyhow;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Issuers we accept Google ID tokens from. This allow-list is a trust
/// boundary and is deliberately not configurable.
const TRUSTED_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const KEY_REFRESH: Duration = Duration::from_secs(3600);

/// Profile extracted from a verified third-party identity token.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Verifies an opaque third-party identity token and yields the identity it
/// carries. Behind a trait so tests can inject a static verifier.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> anyhow::Result<ExternalIdentity>;
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    email: String,
    #[serde(default)]
    name: String,
    picture: Option<String>,
}

#[derive(Default)]
struct CachedKeys {
    fetched_at: Option<Instant>,
    keys: Vec<Jwk>,
}

/// Validates Google-issued ID tokens: RS256 signature against Google's
/// published JWKS, expiry, audience = our client id, issuer in the allow-list.
pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: String,
    keys: RwLock<CachedKeys>,
}

impl GoogleVerifier {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            keys: RwLock::new(CachedKeys::default()),
        }
    }

    async fn cached_key(&self, kid: &str) -> Option<Jwk> {
        let guard = self.keys.read().await;
        let fetched_at = guard.fetched_at?;
        if fetched_at.elapsed() > KEY_REFRESH {
            return None;
        }
        guard.keys.iter().find(|k| k.kid == kid).cloned()
    }

    async fn key_for(&self, kid: &str) -> anyhow::Result<Jwk> {
        if let Some(key) = self.cached_key(kid).await {
            return Ok(key);
        }

        // Cache miss or stale: refetch. Also covers Google key rotation.
        let jwks: Jwks = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(count = jwks.keys.len(), "fetched google signing keys");

        let mut guard = self.keys.write().await;
        guard.fetched_at = Some(Instant::now());
        guard.keys = jwks.keys;
        guard
            .keys
            .iter()
            .find(|k| k.kid == kid)
            .cloned()
            .ok_or_else(|| anyhow!("no matching signing key"))
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<ExternalIdentity> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| anyhow!("identity token missing key id"))?;
        let jwk = self.key_for(&kid).await?;
        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(std::slice::from_ref(&self.client_id));
        validation.set_issuer(&TRUSTED_ISSUERS);

        let data = decode::<GoogleClaims>(token, &key, &validation)?;
        Ok(ExternalIdentity {
            email: data.claims.email,
            name: data.claims.name,
            picture: data.claims.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct FakeClaims {
        email: String,
        exp: usize,
    }

    #[tokio::test]
    async fn rejects_garbage_token_before_any_network_call() {
        let verifier = GoogleVerifier::new("client-id");
        assert!(verifier.verify("not-a-jwt").await.is_err());
        assert!(verifier.verify("").await.is_err());
    }

    #[tokio::test]
    async fn rejects_token_without_key_id() {
        // HS256 token with no kid in the header; fails before key lookup.
        let claims = FakeClaims {
            email: "a@b.com".into(),
            exp: 4102444800,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"whatever"),
        )
        .unwrap();

        let verifier = GoogleVerifier::new("client-id");
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(err.to_string().contains("missing key id"));
    }
}
