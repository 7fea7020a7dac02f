use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing;
use waterme_core::ProviderError;

use crate::credentials::ServiceAccount;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before Google says they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

/// OAuth2 access tokens for the FCM scope, obtained with a signed
/// service-account assertion and cached until shortly before expiry.
pub struct AccessTokenSource {
    account: ServiceAccount,
    key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenSource {
    pub fn new(account: ServiceAccount, http: reqwest::Client) -> Result<Self, ProviderError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| ProviderError::Misconfigured(format!("invalid service account key: {}", e)))?;

        Ok(Self {
            account,
            key,
            http,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, ProviderError> {
        // Held across the refresh so concurrent callers wait for one exchange.
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if now < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let response = self.exchange(now).await?;
        tracing::debug!("Obtained FCM access token valid for {}s", response.expires_in);

        let lifetime = (response.expires_in - REFRESH_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            refresh_at: now + Duration::seconds(lifetime),
        });
        Ok(response.access_token)
    }

    /// Drops the cached token so the next call exchanges a fresh one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, ProviderError> {
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: FCM_SCOPE,
            aud: &self.account.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();

        encode(&header, &claims, &self.key)
            .map_err(|e| ProviderError::Auth(format!("failed to sign assertion: {}", e)))
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<TokenResponse, ProviderError> {
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::Auth(format!("invalid token response: {}", e)))
    }
}
