//! Service-account authentication for Google Cloud APIs.
//!
//! A signed RS256 assertion is exchanged at the key's `token_uri` for a
//! short-lived bearer token, which is cached until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CredentialError;
use crate::util::http;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_S: i64 = 3600;
const REFRESH_MARGIN_S: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account JSON key that are needed here.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        if !path.exists() {
            return Err(CredentialError::NotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Hands out bearer tokens for one service account and scope.
pub struct TokenSource {
    key: ServiceAccountKey,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(key: ServiceAccountKey, scope: impl Into<String>) -> Self {
        Self {
            key,
            scope: scope.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    /// Build the signed assertion for the token exchange.
    fn assertion(&self, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_S,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &signing_key)?)
    }

    /// Return a valid access token, fetching a new one when needed.
    ///
    /// The cache lock is held during a refresh so concurrent callers wait for
    /// one exchange instead of racing.
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_S) > now {
                return Ok(token.value.clone());
            }
        }

        let token = self.fetch(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, CredentialError> {
        let jwt = self.assertion(now)?;
        debug!("Exchanging service-account assertion at {}", self.key.token_uri);

        let resp = http::client()
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::Exchange(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Exchange(format!("{}: {}", status.as_u16(), text)));
        }

        let data: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CredentialError::Exchange(format!("invalid token response: {e}")))?;

        Ok(CachedToken {
            value: data.access_token,
            expires_at: now + Duration::seconds(data.expires_in.unwrap_or(ASSERTION_LIFETIME_S)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FIXTURE: &str = include_str!("../../tests/fixtures/service_account.json");

    fn key_with_token_uri(uri: String) -> ServiceAccountKey {
        let mut key = ServiceAccountKey::from_json(FIXTURE).unwrap();
        key.token_uri = uri;
        key
    }

    #[test]
    fn test_parse_key() {
        let key = ServiceAccountKey::from_json(FIXTURE).unwrap();
        assert_eq!(key.client_email, "duobot@duobot-test.iam.gserviceaccount.com");
        assert_eq!(key.project_id.as_deref(), Some("duobot-test"));
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_token_uri_defaults() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email": "a@b.c", "private_key": "pem"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.project_id.is_none());
    }

    #[test]
    fn test_from_file_missing() {
        let err = ServiceAccountKey::from_file(Path::new("/nonexistent/sa.json")).unwrap_err();
        assert!(matches!(err, CredentialError::NotFound(_)));
    }

    #[test]
    fn test_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ServiceAccountKey::from_file(&path),
            Err(CredentialError::Parse(_))
        ));
    }

    #[test]
    fn test_assertion_is_three_part_jwt() {
        let source = TokenSource::new(
            ServiceAccountKey::from_json(FIXTURE).unwrap(),
            CLOUD_PLATFORM_SCOPE,
        );
        let jwt = source.assertion(Utc::now()).unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }

    #[test]
    fn test_bad_private_key() {
        let key = ServiceAccountKey::from_json(
            r#"{"client_email": "a@b.c", "private_key": "not a pem"}"#,
        )
        .unwrap();
        let source = TokenSource::new(key, CLOUD_PLATFORM_SCOPE);
        assert!(matches!(
            source.assertion(Utc::now()),
            Err(CredentialError::Sign(_))
        ));
    }

    #[tokio::test]
    async fn test_access_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = TokenSource::new(
            key_with_token_uri(format!("{}/token", server.uri())),
            CLOUD_PLATFORM_SCOPE,
        );
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
        assert_eq!(source.access_token().await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_exchange_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let source = TokenSource::new(
            key_with_token_uri(format!("{}/token", server.uri())),
            CLOUD_PLATFORM_SCOPE,
        );
        match source.access_token().await {
            Err(CredentialError::Exchange(msg)) => assert!(msg.contains("invalid_grant")),
            other => panic!("expected Exchange error, got {other:?}"),
        }
    }
}
