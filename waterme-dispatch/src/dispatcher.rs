use std::sync::Arc;
use tokio::time::Instant;
use tracing;
use waterme_core::{mask_token, ProviderError, PushMessage, PushProvider, TokenOutcome, MAX_TOKENS_PER_CALL};

use crate::deadline::within;
use crate::stats::DispatchStats;

/// Consecutive chunks of at most `size` tokens (clamped to the provider
/// limit), in input order.
pub fn chunk_tokens(tokens: &[String], size: usize) -> std::slice::Chunks<'_, String> {
    tokens.chunks(size.clamp(1, MAX_TOKENS_PER_CALL))
}

/// Fans one message out to the provider in provider-sized chunks.
pub struct BatchDispatcher {
    provider: Arc<dyn PushProvider>,
    batch_size: usize,
}

impl BatchDispatcher {
    pub fn new(provider: Arc<dyn PushProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.clamp(1, MAX_TOKENS_PER_CALL),
        }
    }

    /// Sends `message` to every token and returns the tokens the provider
    /// rejected. Chunks that fail as a whole count as failed but are not
    /// returned: nothing is known about the individual tokens.
    pub async fn dispatch(
        &self,
        tokens: &[String],
        message: &PushMessage,
        stats: &DispatchStats,
        deadline: Instant,
    ) -> Vec<String> {
        let mut failed_tokens = Vec::new();

        for chunk in chunk_tokens(tokens, self.batch_size) {
            let result = within(
                deadline,
                || ProviderError::Timeout,
                self.provider.send_batch(chunk, message),
            )
            .await;

            let outcomes = match result {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    tracing::error!("Error sending notification batch of {} tokens: {}", chunk.len(), e);
                    stats.record_failed(chunk.len());
                    continue;
                }
            };

            if outcomes.len() != chunk.len() {
                tracing::warn!(
                    "Provider returned {} outcomes for {} tokens",
                    outcomes.len(),
                    chunk.len()
                );
            }

            let mut sent = 0;
            let mut failed = 0;
            for (i, token) in chunk.iter().enumerate() {
                match outcomes.get(i) {
                    Some(TokenOutcome::Delivered) => sent += 1,
                    Some(TokenOutcome::Rejected { reason }) => {
                        tracing::debug!("Token failed: {}, error: {}", mask_token(token), reason);
                        failed += 1;
                        failed_tokens.push(token.clone());
                    }
                    Some(TokenOutcome::Failed { reason }) => {
                        tracing::debug!("Token not reached: {}, error: {}", mask_token(token), reason);
                        failed += 1;
                    }
                    None => failed += 1,
                }
            }
            stats.record_sent(sent);
            stats.record_failed(failed);
        }

        failed_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    proptest! {
        #[test]
        fn chunks_concatenate_to_input(len in 0_usize..1800, size in 1_usize..700) {
            let tokens: Vec<String> = (0..len).map(|i| format!("tok-{i}")).collect();
            let chunks: Vec<&[String]> = chunk_tokens(&tokens, size).collect();

            prop_assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= MAX_TOKENS_PER_CALL));
            prop_assert!(chunks.iter().all(|c| c.len() <= size));
            prop_assert_eq!(chunks.concat(), tokens);
        }
    }

    /// Rejects tokens starting with `bad`, reports tokens starting with
    /// `busy` as not reached, fails whole calls whose first token starts
    /// with `down`.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl PushProvider for ScriptedProvider {
        async fn send_batch(
            &self,
            tokens: &[String],
            _message: &PushMessage,
        ) -> Result<Vec<TokenOutcome>, ProviderError> {
            self.calls.lock().push(tokens.to_vec());
            if tokens[0].starts_with("down") {
                return Err(ProviderError::Transport("connection reset".to_string()));
            }
            Ok(tokens
                .iter()
                .map(|t| {
                    if t.starts_with("bad") {
                        TokenOutcome::Rejected {
                            reason: "UNREGISTERED".to_string(),
                        }
                    } else if t.starts_with("busy") {
                        TokenOutcome::Failed {
                            reason: "UNAVAILABLE".to_string(),
                        }
                    } else {
                        TokenOutcome::Delivered
                    }
                })
                .collect())
        }
    }

    fn message() -> PushMessage {
        PushMessage {
            title: "t".to_string(),
            body: "b".to_string(),
            data: BTreeMap::new(),
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn splits_into_provider_sized_calls() {
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = BatchDispatcher::new(provider.clone(), 500);
        let tokens: Vec<String> = (0..1201).map(|i| format!("tok-{i}")).collect();
        let stats = DispatchStats::new();

        let failed = dispatcher.dispatch(&tokens, &message(), &stats, deadline()).await;

        assert!(failed.is_empty());
        let sizes: Vec<usize> = provider.calls.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![500, 500, 201]);
        assert_eq!(stats.snapshot().sent, 1201);
    }

    #[tokio::test]
    async fn collects_rejected_tokens_across_chunks() {
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = BatchDispatcher::new(provider, 2);
        let tokens: Vec<String> = ["ok-1", "bad-1", "ok-2", "bad-2", "bad-3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let stats = DispatchStats::new();

        let failed = dispatcher.dispatch(&tokens, &message(), &stats, deadline()).await;

        assert_eq!(failed, vec!["bad-1", "bad-2", "bad-3"]);
        let snapshot = stats.snapshot();
        assert_eq!((snapshot.sent, snapshot.failed), (2, 3));
    }

    #[tokio::test]
    async fn transient_failures_count_but_keep_the_token() {
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = BatchDispatcher::new(provider, 500);
        let tokens: Vec<String> = ["ok-1", "busy-1", "bad-1"].iter().map(|s| s.to_string()).collect();
        let stats = DispatchStats::new();

        let failed = dispatcher.dispatch(&tokens, &message(), &stats, deadline()).await;

        assert_eq!(failed, vec!["bad-1"]);
        let snapshot = stats.snapshot();
        assert_eq!((snapshot.sent, snapshot.failed), (1, 2));
    }

    #[tokio::test]
    async fn whole_chunk_failure_counts_but_does_not_blame_tokens() {
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = BatchDispatcher::new(provider.clone(), 2);
        let tokens: Vec<String> = ["down-1", "x", "ok-1"].iter().map(|s| s.to_string()).collect();
        let stats = DispatchStats::new();

        let failed = dispatcher.dispatch(&tokens, &message(), &stats, deadline()).await;

        assert!(failed.is_empty());
        assert_eq!(provider.calls.lock().len(), 2);
        let snapshot = stats.snapshot();
        assert_eq!((snapshot.sent, snapshot.failed), (1, 2));
    }

    #[tokio::test]
    async fn nothing_is_sent_past_the_deadline() {
        let provider = Arc::new(ScriptedProvider::default());
        let dispatcher = BatchDispatcher::new(provider.clone(), 500);
        let tokens = vec!["ok-1".to_string()];
        let stats = DispatchStats::new();

        let failed = dispatcher
            .dispatch(&tokens, &message(), &stats, Instant::now())
            .await;

        assert!(failed.is_empty());
        assert!(provider.calls.lock().is_empty());
        assert_eq!(stats.snapshot().failed, 1);
    }
}
