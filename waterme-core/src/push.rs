use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::ProviderError;

/// Hard per-call recipient limit of the push provider.
pub const MAX_TOKENS_PER_CALL: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// Delivery result for one token of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Delivered,
    /// The provider reports the token itself as unusable. It is deactivated.
    Rejected { reason: String },
    /// Not delivered this time, the token stays active.
    Failed { reason: String },
}

impl TokenOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, TokenOutcome::Delivered)
    }
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Sends one message to at most [`MAX_TOKENS_PER_CALL`] tokens.
    ///
    /// On success the returned outcomes are positionally aligned with
    /// `tokens`.
    async fn send_batch(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, ProviderError>;
}

/// Short, log-safe form of a device token.
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(12).collect();
    if prefix.len() < token.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_token_keeps_short_prefix() {
        assert_eq!(mask_token("abcdefghijklmnopqrstuvwxyz"), "abcdefghijkl...");
        assert_eq!(mask_token("short"), "short");
    }
}
