use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing;
use waterme_core::config::DeliveryConfig;
use waterme_core::{mask_token, ProviderError, PushMessage, PushProvider, TokenOutcome, MAX_TOKENS_PER_CALL};

use crate::auth::AccessTokenSource;
use crate::credentials::ServiceAccount;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

impl ErrorBody {
    /// The FCM-specific error code when present (`UNREGISTERED`, ...),
    /// otherwise the generic RPC status.
    fn reason(&self) -> Option<String> {
        self.details
            .iter()
            .find_map(|d| d.get("errorCode").and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| self.status.clone())
    }
}

/// [`PushProvider`] backed by the FCM HTTP v1 API.
///
/// HTTP v1 takes one token per request, so a batch becomes a bounded fan-out
/// of `messages:send` calls whose results are collected in input order.
pub struct FcmProvider {
    http: reqwest::Client,
    auth: AccessTokenSource,
    send_url: String,
    concurrency: usize,
}

impl FcmProvider {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        tracing::info!("Initializing FCM client");

        let account = ServiceAccount::from_config(config)?;
        let provider = Self::with_account(account, &config.fcm_endpoint, config.fcm_request_concurrency)
            .map_err(|e| anyhow!("Failed to create FCM client: {}", e))?;

        tracing::info!("FCM client initialized successfully");
        Ok(provider)
    }

    pub fn with_account(
        account: ServiceAccount,
        endpoint: &str,
        concurrency: usize,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Misconfigured(format!("failed to build HTTP client: {}", e)))?;

        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            endpoint.trim_end_matches('/'),
            account.project_id
        );
        tracing::info!("FCM project: {}", account.project_id);

        Ok(Self {
            auth: AccessTokenSource::new(account, http.clone())?,
            http,
            send_url,
            concurrency: concurrency.max(1),
        })
    }

    async fn send_one(&self, access_token: &str, token: &str, message: &PushMessage) -> Attempt {
        let body = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
                "android": { "priority": "high" },
                "apns": { "headers": { "apns-priority": "10" } },
            }
        });

        let response = match self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("FCM request for token {} failed: {}", mask_token(token), e);
                return Attempt::Unavailable(format!("transport: {}", e));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Attempt::Delivered;
        }

        let raw = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ErrorEnvelope>(&raw).ok();
        let reason = parsed.as_ref().and_then(|e| e.error.reason());

        tracing::debug!(
            "FCM refused token {}: {} {} ({})",
            mask_token(token),
            status.as_u16(),
            reason.as_deref().unwrap_or("-"),
            parsed
                .as_ref()
                .and_then(|e| e.error.message.as_deref())
                .unwrap_or("no message")
        );
        classify(status, reason)
    }
}

/// One `messages:send` answer, before it is folded into batch results.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Attempt {
    Delivered,
    /// The token is invalid for good.
    Rejected(String),
    /// Our credentials were refused; says nothing about the token.
    Unauthorized(String),
    /// Quota, server or network trouble; says nothing about the token.
    Unavailable(String),
}

impl Attempt {
    fn into_outcome(self) -> TokenOutcome {
        match self {
            Attempt::Delivered => TokenOutcome::Delivered,
            Attempt::Rejected(reason) => TokenOutcome::Rejected { reason },
            Attempt::Unauthorized(reason) | Attempt::Unavailable(reason) => {
                TokenOutcome::Failed { reason }
            }
        }
    }

    fn reached_fcm(&self) -> bool {
        matches!(self, Attempt::Delivered | Attempt::Rejected(_))
    }
}

const TOKEN_ERRORS: [&str; 3] = ["UNREGISTERED", "SENDER_ID_MISMATCH", "INVALID_ARGUMENT"];

fn classify(status: StatusCode, reason: Option<String>) -> Attempt {
    if status.is_success() {
        return Attempt::Delivered;
    }
    let reason = reason.unwrap_or_else(|| status.as_u16().to_string());

    if TOKEN_ERRORS.contains(&reason.as_str()) {
        Attempt::Rejected(reason)
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || reason == "THIRD_PARTY_AUTH_ERROR"
    {
        Attempt::Unauthorized(reason)
    } else {
        Attempt::Unavailable(reason)
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send_batch(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, ProviderError> {
        if tokens.is_empty() || tokens.len() > MAX_TOKENS_PER_CALL {
            return Err(ProviderError::InvalidBatch(tokens.len()));
        }

        let access_token = self.auth.access_token().await?;

        let requests: Vec<_> = tokens
            .iter()
            .map(|token| self.send_one(&access_token, token, message))
            .collect();
        let attempts: Vec<Attempt> = stream::iter(requests)
            .buffered(self.concurrency)
            .collect()
            .await;

        let unauthorized = attempts.iter().find_map(|a| match a {
            Attempt::Unauthorized(reason) => Some(reason.clone()),
            _ => None,
        });
        if unauthorized.is_some() {
            self.auth.invalidate().await;
        }

        // Nothing reached FCM: an outage, not a verdict on the tokens.
        if !attempts.iter().any(Attempt::reached_fcm) {
            if let Some(reason) = unauthorized {
                return Err(ProviderError::Auth(format!("FCM refused credentials: {}", reason)));
            }
            let reason = attempts
                .into_iter()
                .find_map(|a| match a {
                    Attempt::Unavailable(reason) => Some(reason),
                    _ => None,
                })
                .unwrap_or_default();
            return Err(ProviderError::Transport(format!("FCM unavailable: {}", reason)));
        }

        Ok(attempts.into_iter().map(Attempt::into_outcome).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_token_errors_reject_the_token() {
        assert_eq!(
            classify(StatusCode::NOT_FOUND, Some("UNREGISTERED".to_string())),
            Attempt::Rejected("UNREGISTERED".to_string())
        );
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, Some("INVALID_ARGUMENT".to_string())),
            Attempt::Rejected("INVALID_ARGUMENT".to_string())
        );
        assert_eq!(
            classify(StatusCode::FORBIDDEN, Some("SENDER_ID_MISMATCH".to_string())),
            Attempt::Rejected("SENDER_ID_MISMATCH".to_string())
        );
    }

    #[test]
    fn outages_and_auth_problems_keep_the_token() {
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, Some("UNAUTHENTICATED".to_string())),
            Attempt::Unauthorized("UNAUTHENTICATED".to_string())
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, Some("QUOTA_EXCEEDED".to_string())),
            Attempt::Unavailable("QUOTA_EXCEEDED".to_string())
        );
        assert_eq!(
            classify(StatusCode::SERVICE_UNAVAILABLE, None),
            Attempt::Unavailable("503".to_string())
        );
        // A bare 404 is a wrong endpoint or project, not a dead token.
        assert_eq!(classify(StatusCode::NOT_FOUND, None), Attempt::Unavailable("404".to_string()));
        assert_eq!(
            Attempt::Unavailable("503".to_string()).into_outcome(),
            TokenOutcome::Failed {
                reason: "503".to_string()
            }
        );
    }
}
