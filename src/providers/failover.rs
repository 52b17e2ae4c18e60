//! Failover across an ordered list of providers with bounded retry.
//!
//! Each operation walks the provider list in order; a full pass counts as
//! one attempt. Attempts are separated by exponential backoff with jitter.
//! After the retry budget is spent the last error (or `Exhausted`) is
//! returned and the caller's own fallback policy takes over.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::error::ProviderError;
use crate::providers::{AiProvider, CompletionRequest, CompletionResponse};

/// Ordered provider list with a bounded retry budget.
pub struct FailoverProvider {
    providers: Vec<Arc<dyn AiProvider>>,
    /// Extra full passes over the list after the first (0 = single pass).
    max_retries: u32,
    base_backoff: Duration,
}

impl FailoverProvider {
    pub fn new(providers: Vec<Arc<dyn AiProvider>>) -> Self {
        Self {
            providers,
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    /// Backoff before attempt `n` (1-based): base * 2^(n-1) plus jitter.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(6));
        let jitter_ms = rand::thread_rng().gen_range(0..100);
        exp + Duration::from_millis(jitter_ms)
    }

    async fn run<'a, F, Fut, T>(&'a self, operation: &str, call: F) -> Result<T, ProviderError>
    where
        F: Fn(&'a dyn AiProvider) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error: Option<ProviderError> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_for(attempt)).await;
            }
            for provider in &self.providers {
                match call(provider.as_ref()).await {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        warn!(
                            provider = provider.name(),
                            operation,
                            attempt,
                            error = %e,
                            "Provider call failed; trying next"
                        );
                        last_error = Some(e);
                    }
                }
            }
        }
        Err(last_error.unwrap_or(ProviderError::Exhausted {
            attempts: self.max_retries + 1,
        }))
    }
}

#[async_trait]
impl AiProvider for FailoverProvider {
    fn name(&self) -> &str {
        "failover"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.run("complete", |p| {
            let request = request.clone();
            async move { p.complete(request).await }
        })
        .await
    }

    async fn transcribe(&self, audio: &[u8], filename: &str) -> Result<String, ProviderError> {
        self.run("transcribe", |p| async move { p.transcribe(audio, filename).await })
            .await
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        self.run("synthesize", |p| async move { p.synthesize(text).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails `failures` times before succeeding.
    struct FlakyProvider {
        name: String,
        failures: AtomicU32,
    }

    impl FlakyProvider {
        fn new(name: &str, failures: u32) -> Self {
            Self {
                name: name.to_string(),
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl AiProvider for FlakyProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(ProviderError::RequestFailed {
                    provider: self.name.clone(),
                    reason: "flaky".to_string(),
                });
            }
            Ok(CompletionResponse {
                content: format!("ok from {}", self.name),
            })
        }

        async fn transcribe(&self, _audio: &[u8], _filename: &str) -> Result<String, ProviderError> {
            Ok("text".to_string())
        }

        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, ProviderError> {
            Ok(vec![1, 2, 3])
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![crate::providers::ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn falls_through_to_second_provider() {
        let failover = FailoverProvider::new(vec![
            Arc::new(FlakyProvider::new("primary", u32::MAX)),
            Arc::new(FlakyProvider::new("secondary", 0)),
        ])
        .with_retry(0, Duration::from_millis(1));

        let response = failover.complete(request()).await.unwrap();
        assert_eq!(response.content, "ok from secondary");
    }

    #[tokio::test]
    async fn retries_recover_a_transient_failure() {
        let failover = FailoverProvider::new(vec![Arc::new(FlakyProvider::new("only", 1))])
            .with_retry(2, Duration::from_millis(1));

        let response = failover.complete(request()).await.unwrap();
        assert_eq!(response.content, "ok from only");
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let failover = FailoverProvider::new(vec![Arc::new(FlakyProvider::new("only", u32::MAX))])
            .with_retry(1, Duration::from_millis(1));

        let err = failover.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed { .. }));
    }
}
