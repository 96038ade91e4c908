//! Orchestrator: three independent judges, then the aggregator.
//!
//! Judges run sequentially against the shared backend and never see each
//! other's output. A complete evaluation (no excluded judges) is cached by
//! content hash; anything less is recomputed next time.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::aggregate::{AggregateResult, Aggregator, AggregatorError};
use crate::cache::{
    settings_hash, CacheError, EvaluationCache, EvaluationCacheKey, SqliteEvaluationCache,
};
use crate::config::{ConfigError, PanelConfig};
use crate::events::{EvalEvent, EventSink, TracingEventSink};
use crate::gateway::ollama::OllamaAdapter;
use crate::gateway::{ChatGateway, ChatModel, ProviderError, ProviderGateway, UsageSink};
use crate::judge::{Judge, JudgeDefinition, JudgeError, JudgeSettings};
use crate::prompts::panel_template_hash;
use crate::rubric::{JudgeKind, PerJudge};
use crate::submission::SubmissionContent;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error(transparent)]
    Weights(#[from] AggregatorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Static description of one panel seat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeInfo {
    pub judge: JudgeKind,
    pub agent: &'static str,
    pub model: String,
    pub weight: f64,
    pub max_score: u32,
}

/// Result of one batch row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AggregateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn failed(team: impl Into<String>, error: impl ToString) -> Self {
        Self {
            team: team.into(),
            result: None,
            error: Some(error.to_string()),
        }
    }

    fn from_result(team: String, result: Result<AggregateResult, PanelError>) -> Self {
        match result {
            Ok(result) => Self {
                team,
                result: Some(result),
                error: None,
            },
            Err(err) => Self::failed(team, err),
        }
    }
}

pub struct Panel {
    gateway: Arc<dyn ChatGateway>,
    model: ChatModel,
    settings: JudgeSettings,
    aggregator: Aggregator,
    events: Arc<dyn EventSink>,
    cache: Option<Arc<dyn EvaluationCache>>,
}

impl Panel {
    /// Default weights and settings, `tracing` events, no cache.
    pub fn new(gateway: Arc<dyn ChatGateway>, model: ChatModel) -> Self {
        Self {
            gateway,
            model,
            settings: JudgeSettings::default(),
            aggregator: Aggregator::default(),
            events: Arc::new(TracingEventSink),
            cache: None,
        }
    }

    /// Wire the Ollama gateway, weights, settings and optional cache from config.
    pub fn from_config<U: UsageSink + 'static>(
        config: &PanelConfig,
        usage_sink: Arc<U>,
    ) -> Result<Self, PanelError> {
        config.validate()?;
        let adapter = OllamaAdapter::with_config(&config.backend.base_url, config.timeout())?;
        let gateway = ProviderGateway::with_config(adapter, usage_sink, config.gateway_config());

        let mut panel = Self::new(Arc::new(gateway), ChatModel::ollama(&config.backend.model))
            .with_settings(config.judge_settings())
            .with_weights(config.weights)?;
        if config.cache.enabled {
            let cache = SqliteEvaluationCache::new(&config.cache.path)?;
            panel = panel.with_cache(Arc::new(cache));
        }
        Ok(panel)
    }

    pub fn with_weights(mut self, weights: PerJudge<f64>) -> Result<Self, PanelError> {
        self.aggregator = Aggregator::new(weights)?.with_events(self.events.clone());
        Ok(self)
    }

    pub fn with_settings(mut self, settings: JudgeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.aggregator = std::mem::take(&mut self.aggregator).with_events(events.clone());
        self.events = events;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn EvaluationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    /// Build a standalone judge sharing this panel's gateway and settings.
    pub fn judge(&self, kind: JudgeKind) -> Judge {
        Judge::new(kind, self.gateway.clone(), self.model.clone())
            .with_settings(self.settings)
            .with_events(self.events.clone())
    }

    pub fn judge_info(&self) -> Vec<JudgeInfo> {
        JudgeKind::ALL
            .into_iter()
            .map(|kind| JudgeInfo {
                judge: kind,
                agent: JudgeDefinition::for_kind(kind).agent,
                model: self.model.model_id().to_string(),
                weight: *self.aggregator.weights().get(kind),
                max_score: kind.rubric().max_total(),
            })
            .collect()
    }

    pub async fn evaluate(
        &self,
        problem_statement: &str,
        ppt_content: &str,
        visual_analysis: &str,
    ) -> Result<AggregateResult, PanelError> {
        let content = SubmissionContent::new(problem_statement, ppt_content, visual_analysis);
        self.evaluate_content(&content).await
    }

    pub async fn evaluate_content(
        &self,
        content: &SubmissionContent,
    ) -> Result<AggregateResult, PanelError> {
        let key = EvaluationCacheKey::new(
            self.model.model_id(),
            panel_template_hash(),
            &settings_hash(self.aggregator.weights(), &self.settings),
            content,
        );

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(hit)) => {
                    self.events.record(EvalEvent::CacheHit {
                        key_hash: key.key_hash.clone(),
                    });
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "cache lookup failed; evaluating"),
            }
        }

        let evaluation_id = Uuid::new_v4();
        tracing::info!(%evaluation_id, model = self.model.model_id(), "starting panel evaluation");

        let technical = self.run_judge(JudgeKind::Technical, content, evaluation_id).await?;
        let product = self.run_judge(JudgeKind::Product, content, evaluation_id).await?;
        let execution = self.run_judge(JudgeKind::Execution, content, evaluation_id).await?;

        let result = self
            .aggregator
            .aggregate(PerJudge::new(technical, product, execution));

        if let Some(cache) = &self.cache {
            if result.excluded_judges.is_empty() {
                if let Err(err) = cache.put(&key, &result).await {
                    tracing::warn!(error = %err, "failed to store evaluation in cache");
                }
            } else {
                tracing::debug!(
                    excluded = result.excluded_judges.len(),
                    "incomplete evaluation not cached"
                );
            }
        }

        Ok(result)
    }

    async fn run_judge(
        &self,
        kind: JudgeKind,
        content: &SubmissionContent,
        evaluation_id: Uuid,
    ) -> Result<crate::judge::JudgeResult, JudgeError> {
        self.judge(kind)
            .evaluate_with_id(content, Some(evaluation_id))
            .await
    }

    /// Evaluate teams in input order with at most `workers` evaluations in flight.
    ///
    /// Backend calls are still bounded by the gateway; a failed row does not
    /// stop the batch.
    pub async fn evaluate_batch(
        &self,
        submissions: Vec<(String, SubmissionContent)>,
        workers: usize,
    ) -> Vec<BatchOutcome> {
        stream::iter(submissions.into_iter().map(|(team, content)| async move {
            let result = self.evaluate_content(&content).await;
            if let Err(err) = &result {
                tracing::warn!(%team, error = %err, "batch evaluation failed");
            }
            BatchOutcome::from_result(team, result)
        }))
        .buffered(workers.max(1))
        .collect()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatRequest, ChatResponse, FinishReason};
    use std::time::Duration;

    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl ChatGateway for Fixed {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.0.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                latency: Duration::ZERO,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[test]
    fn judge_info_lists_every_seat() {
        let panel = Panel::new(Arc::new(Fixed("{}")), ChatModel::ollama("m"));
        let info = panel.judge_info();
        assert_eq!(info.len(), 3);
        assert_eq!(info[1].agent, "Product & Innovation Judge");
        assert_eq!(info[2].max_score, 40);
        assert!((info.iter().map(|i| i.weight).sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bad_weights_are_rejected() {
        let panel = Panel::new(Arc::new(Fixed("{}")), ChatModel::ollama("m"));
        assert!(matches!(
            panel.with_weights(PerJudge::new(0.2, 0.2, 0.1)),
            Err(PanelError::Weights(_))
        ));
    }

    #[tokio::test]
    async fn unusable_output_still_reports() {
        let panel = Panel::new(Arc::new(Fixed("no json at all")), ChatModel::ollama("m"));
        let result = panel.evaluate("p", "c", "v").await.unwrap();
        assert_eq!(result.final_score, 0.0);
        assert_eq!(result.excluded_judges, JudgeKind::ALL.to_vec());
    }
}
