//! Model gateway for the locally served judge model.
//!
//! The backend is one shared model-serving process, so the gateway bounds
//! in-flight calls and spaces call starts by a fixed minimum interval.

pub mod error;
pub mod ollama;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

use ollama::{ChatProvider, OllamaAdapter};
use usage::{CallStatus, ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use error::{ErrorContext, ProviderError};
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Transport-level retries for retryable errors. Zero by default: a dead
    /// local backend does not come back within a backoff window.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Maximum concurrent calls against the backend.
    pub max_concurrent_requests: usize,
    /// Minimum spacing between the starts of consecutive calls.
    pub min_request_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay: Duration::from_secs(1),
            max_concurrent_requests: 1,
            min_request_interval: Duration::ZERO,
        }
    }
}

pub struct ProviderGateway<U: UsageSinkTrait> {
    ollama: OllamaAdapter,
    usage_sink: Arc<U>,
    config: GatewayConfig,
    permits: Semaphore,
    last_call: Mutex<Option<Instant>>,
}

#[async_trait::async_trait]
impl<U: UsageSinkTrait> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSinkTrait> ProviderGateway<U> {
    pub fn with_config(ollama: OllamaAdapter, usage_sink: Arc<U>, config: GatewayConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_requests.max(1));
        Self {
            ollama,
            usage_sink,
            config,
            permits,
            last_call: Mutex::new(None),
        }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProviderError::config("gateway semaphore closed"))?;

        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            self.pace().await;
            let result = self.ollama.chat(&req).await;
            match result {
                Ok(resp) => {
                    self.record_usage(&req, &resp, CallStatus::Success, None)
                        .await;
                    return Ok(resp);
                }
                Err(err) => {
                    let code = err.code().to_string();
                    self.record_usage(&req, &ChatResponse::empty(), CallStatus::Error, Some(code))
                        .await;

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying backend call"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::provider("ollama", "unknown error", false)))
    }

    /// Wait until at least `min_request_interval` has passed since the last call started.
    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.config.min_request_interval {
                sleep(self.config.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
        status: CallStatus,
        error_code: Option<String>,
    ) {
        let record = ProviderCallRecord::new(
            req.model.provider(),
            "api/chat",
            req.model.model_id(),
            req.attribution.caller,
        )
        .tokens(resp.input_tokens, resp.output_tokens)
        .evaluation(req.attribution.evaluation_id)
        .latency(resp.latency.as_millis() as u64);

        let record = if status == CallStatus::Error {
            record.error(error_code.unwrap_or_else(|| "provider_error".to_string()))
        } else {
            record
        };

        self.usage_sink.record(record).await;
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(base, 9), Duration::from_millis(3200));
    }
}
