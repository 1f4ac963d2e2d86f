use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use recap_common::{Error, Result, StatusRecord};
use recap_config::LlmConfig;
use tracing::{debug, info, warn};

use crate::local_fallback::{LOCAL_FALLBACK_MODEL, LocalFallbackSummarizer};
use crate::providers::{LlmProvider, LlmRequest};
use crate::relay::RelaySink;

/// How one model's attempts ended within a single generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    Timeout,
    ConnectionError,
    UpstreamHttpError,
    ProtocolError,
    /// Every allowed attempt failed with a retryable error.
    Exhausted,
}

impl AttemptOutcome {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout(_) => AttemptOutcome::Timeout,
            Error::Connection(_) => AttemptOutcome::ConnectionError,
            Error::UpstreamHttp { .. } => AttemptOutcome::UpstreamHttpError,
            _ => AttemptOutcome::ProtocolError,
        }
    }
}

/// Per-model bookkeeping for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationAttempt {
    pub model: String,
    /// Attempts beyond the first.
    pub retry_count: u32,
    pub outcome: AttemptOutcome,
    pub last_error: Option<String>,
}

impl GenerationAttempt {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            retry_count: 0,
            outcome: AttemptOutcome::Pending,
            last_error: None,
        }
    }
}

/// Result of a generation that reached a successful terminal state.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// Text produced by the winning attempt.
    pub text: String,
    /// The model that produced it, or [`LOCAL_FALLBACK_MODEL`].
    pub model: String,
    pub attempts: Vec<GenerationAttempt>,
}

impl GenerationOutcome {
    pub fn used_local_fallback(&self) -> bool {
        self.model == LOCAL_FALLBACK_MODEL
    }
}

/// Walks the configured models in order, retrying each a bounded number of
/// times, and relays every fragment to the caller as it arrives.
pub struct FallbackOrchestrator {
    provider: Option<Arc<dyn LlmProvider>>,
    models: Vec<String>,
    max_attempts: u32,
    read_timeout: Duration,
    retry_delay: Duration,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    local: LocalFallbackSummarizer,
}

impl FallbackOrchestrator {
    /// Without a provider every generation goes straight to the local
    /// summarizer.
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, models: Vec<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            provider,
            models,
            max_attempts: defaults.max_attempts_per_model,
            read_timeout: defaults.timeout(),
            retry_delay: defaults.retry_delay(),
            temperature: Some(defaults.temperature),
            max_tokens: Some(defaults.max_tokens),
            local: LocalFallbackSummarizer,
        }
    }

    pub fn from_config(provider: Option<Arc<dyn LlmProvider>>, config: &LlmConfig) -> Self {
        Self::new(provider, config.models.clone())
            .with_max_attempts(config.max_attempts_per_model)
            .with_read_timeout(config.timeout())
            .with_retry_delay(config.retry_delay())
            .with_generation_params(Some(config.temperature), Some(config.max_tokens))
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Longest wait for the response or the next chunk before the attempt
    /// counts as timed out.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_generation_params(mut self, temperature: Option<f64>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.provider.as_ref()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Every (model, attempt number) pair in the order they may be tried.
    fn attempt_plan(&self) -> Vec<(&str, u32)> {
        self.models
            .iter()
            .flat_map(|model| (1..=self.max_attempts).map(move |n| (model.as_str(), n)))
            .collect()
    }

    /// Produce a summary for `prompt`, relaying text through `sink`.
    ///
    /// Only fails with [`Error::Cancelled`]; when no upstream attempt
    /// succeeds the local summarizer supplies the text from `records`.
    /// Fragments relayed by an attempt that later fails stay relayed.
    pub async fn run(
        &self,
        prompt: &str,
        records: &[StatusRecord],
        sink: &RelaySink,
    ) -> Result<GenerationOutcome> {
        let mut attempts: Vec<GenerationAttempt> = Vec::new();

        if let Some(provider) = &self.provider {
            let mut abandoned: Option<&str> = None;

            for (model, attempt) in self.attempt_plan() {
                if abandoned == Some(model) {
                    continue;
                }
                if attempt == 1 {
                    attempts.push(GenerationAttempt::new(model));
                } else if !self.retry_delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = sink.closed() => return Err(Error::Cancelled),
                    }
                }
                let current = attempts.len() - 1;
                attempts[current].retry_count = attempt - 1;

                info!(
                    provider = provider.provider_id(),
                    model,
                    attempt,
                    max_attempts = self.max_attempts,
                    "requesting completion"
                );
                match self.attempt(provider.as_ref(), model, prompt, sink).await {
                    Ok(text) => {
                        attempts[current].outcome = AttemptOutcome::Success;
                        info!(model, attempt, chars = text.chars().count(), "completion finished");
                        return Ok(GenerationOutcome {
                            text,
                            model: model.to_string(),
                            attempts,
                        });
                    }
                    Err(Error::Cancelled) => {
                        info!(model, attempt, "caller disconnected; aborting upstream request");
                        return Err(Error::Cancelled);
                    }
                    Err(err) => {
                        attempts[current].outcome = AttemptOutcome::from_error(&err);
                        attempts[current].last_error = Some(err.to_string());

                        if !err.is_retryable() {
                            warn!(model, attempt, error = %err, "abandoning model");
                            abandoned = Some(model);
                        } else if attempt >= self.max_attempts {
                            warn!(model, attempt, error = %err, "retries exhausted; moving to next model");
                            attempts[current].outcome = AttemptOutcome::Exhausted;
                        } else {
                            warn!(model, attempt, error = %err, "attempt failed; retrying");
                        }
                    }
                }
            }
            warn!(models = self.models.len(), "all upstream models failed; using local summary");
        } else {
            info!("no upstream provider configured; using local summary");
        }

        let text = self.local.summarize(records);
        sink.emit_fragment(&text).await?;
        attempts.push(GenerationAttempt {
            model: LOCAL_FALLBACK_MODEL.to_string(),
            retry_count: 0,
            outcome: AttemptOutcome::Success,
            last_error: None,
        });
        Ok(GenerationOutcome {
            text,
            model: LOCAL_FALLBACK_MODEL.to_string(),
            attempts,
        })
    }

    /// One upstream call. The accumulated text starts empty every time.
    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        prompt: &str,
        sink: &RelaySink,
    ) -> Result<String> {
        let mut request = LlmRequest::single_turn(model, prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        let mut stream = tokio::select! {
            opened = tokio::time::timeout(self.read_timeout, provider.stream_completion(&request)) => {
                opened.map_err(|_| Error::Timeout(self.read_timeout))??
            }
            _ = sink.closed() => return Err(Error::Cancelled),
        };

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(self.read_timeout, stream.next()) => {
                    next.map_err(|_| Error::Timeout(self.read_timeout))?
                }
                _ = sink.closed() => return Err(Error::Cancelled),
            };

            match next {
                Some(Ok(fragment)) => {
                    sink.emit_fragment(&fragment).await?;
                    text.push_str(&fragment);
                }
                Some(Err(err)) => return Err(err),
                None => {
                    debug!(model, "upstream stream finished");
                    return Ok(text);
                }
            }
        }
    }
}
