//! Generic judge engine.
//!
//! One [`Judge`] interprets a [`JudgeDefinition`]: render the prompt, run the
//! retry protocol, sanitize and validate the recovered object against the
//! rubric, and return a [`JudgeResult`]. A judge never sees another judge's
//! output.

pub mod definition;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::events::{EvalEvent, EventSink, TracingEventSink};
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, ProviderError};
use crate::parse::sanitize_numbers;
use crate::rubric::{JudgeKind, RubricScore};
use crate::submission::SubmissionContent;
use crate::text_budget::ContentBudget;

pub use definition::{JudgeDefinition, IMPROVEMENTS_FIELD};
pub use retry::{run_with_correction, RetryOutcome, RetryState};

/// Marker written into every narrative field of a default result.
pub const COULD_NOT_EVALUATE: &str = "Error: Could not evaluate";
/// Gap entry of a default result.
pub const EVALUATION_FAILED: &str = "Evaluation failed";

// =============================================================================
// Result types
// =============================================================================

/// How many attempts the retry protocol needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeConfidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeReasoning {
    /// Free-text analysis fields, keyed by schema name.
    pub narrative: BTreeMap<String, String>,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub judge: JudgeKind,
    pub agent: String,
    pub model: String,
    scores: Vec<RubricScore>,
    total: u32,
    max_total: u32,
    pub reasoning: JudgeReasoning,
    pub judge_confidence: JudgeConfidence,
}

impl JudgeResult {
    /// Build a result; the total is always the sum of the (clamped) scores.
    pub fn new(
        judge: JudgeKind,
        model: impl Into<String>,
        scores: Vec<RubricScore>,
        reasoning: JudgeReasoning,
        judge_confidence: JudgeConfidence,
    ) -> Self {
        let max_total = judge.rubric().max_total();
        let total = scores.iter().map(RubricScore::value).sum::<u32>().min(max_total);
        Self {
            judge,
            agent: JudgeDefinition::for_kind(judge).agent.to_string(),
            model: model.into(),
            scores,
            total,
            max_total,
            reasoning,
            judge_confidence,
        }
    }

    /// Zero-scored result used when no parseable output was obtained.
    pub fn failed(judge: JudgeKind, model: impl Into<String>) -> Self {
        let definition = JudgeDefinition::for_kind(judge);
        let scores = definition
            .rubric()
            .criteria
            .iter()
            .map(RubricScore::zero)
            .collect();
        let reasoning = JudgeReasoning {
            narrative: definition
                .narrative_fields
                .iter()
                .map(|f| (f.to_string(), COULD_NOT_EVALUATE.to_string()))
                .collect(),
            gaps: vec![EVALUATION_FAILED.to_string()],
            ..Default::default()
        };
        Self::new(judge, model, scores, reasoning, JudgeConfidence::Low)
    }

    pub fn scores(&self) -> &[RubricScore] {
        &self.scores
    }

    pub fn score(&self, criterion: &str) -> Option<u32> {
        self.scores
            .iter()
            .find(|s| s.name() == criterion)
            .map(RubricScore::value)
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn max_total(&self) -> u32 {
        self.max_total
    }

    pub fn is_low_confidence(&self) -> bool {
        self.judge_confidence == JudgeConfidence::Low
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("{judge} judge: model backend unavailable: {source}")]
    BackendUnavailable {
        judge: JudgeKind,
        #[source]
        source: ProviderError,
    },
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgeSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub budget: ContentBudget,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            max_tokens: 1_200,
            temperature: 0.0,
            budget: ContentBudget::default(),
        }
    }
}

pub struct Judge {
    definition: &'static JudgeDefinition,
    gateway: Arc<dyn ChatGateway>,
    model: ChatModel,
    settings: JudgeSettings,
    events: Arc<dyn EventSink>,
}

impl Judge {
    pub fn new(kind: JudgeKind, gateway: Arc<dyn ChatGateway>, model: ChatModel) -> Self {
        Self {
            definition: JudgeDefinition::for_kind(kind),
            gateway,
            model,
            settings: JudgeSettings::default(),
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_settings(mut self, settings: JudgeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn kind(&self) -> JudgeKind {
        self.definition.kind
    }

    pub fn agent(&self) -> &'static str {
        self.definition.agent
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    pub async fn evaluate(&self, content: &SubmissionContent) -> Result<JudgeResult, JudgeError> {
        self.evaluate_with_id(content, None).await
    }

    pub(crate) async fn evaluate_with_id(
        &self,
        content: &SubmissionContent,
        evaluation_id: Option<Uuid>,
    ) -> Result<JudgeResult, JudgeError> {
        let kind = self.kind();
        self.events.record(EvalEvent::JudgeStarted { judge: kind });

        let prompt = self.definition.template.render_with_budget(
            &content.problem_statement,
            &content.ppt_content,
            &content.visual_analysis,
            &self.settings.budget,
        );

        let mut attribution = Attribution::new(self.definition.caller);
        if let Some(id) = evaluation_id {
            attribution = attribution.with_evaluation(id);
        }
        let build = |text: String| {
            ChatRequest::prompt(self.model.clone(), text, attribution.clone())
                .temperature(self.settings.temperature)
                .max_tokens(self.settings.max_tokens)
                .json()
        };

        let outcome =
            run_with_correction(self.gateway.as_ref(), kind, &prompt, build, self.events.as_ref())
                .await
                .map_err(|source| JudgeError::BackendUnavailable { judge: kind, source })?;

        let result = match outcome.parsed {
            Some(parsed) => self.validate(parsed.object, outcome.confidence),
            None => {
                self.events.record(EvalEvent::JudgeDefaulted { judge: kind });
                JudgeResult::failed(kind, self.model.model_id())
            }
        };

        self.events.record(EvalEvent::JudgeCompleted {
            judge: kind,
            total: result.total(),
            max_total: result.max_total(),
            confidence: result.judge_confidence,
        });
        Ok(result)
    }

    /// Clamp every criterion into range, recompute the total and collect reasoning.
    fn validate(&self, object: Map<String, Value>, confidence: JudgeConfidence) -> JudgeResult {
        let kind = self.kind();
        let def = self.definition;
        let object = match sanitize_numbers(Value::Object(object)) {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let reported_scores = object.get(def.scores_key).and_then(Value::as_object);
        let mut scores = Vec::with_capacity(def.rubric().criteria.len());
        for criterion in def.rubric().criteria {
            let raw = match reported_scores.and_then(|s| s.get(criterion.name)).and_then(score_value) {
                Some(raw) => raw,
                None => {
                    self.events.record(EvalEvent::ScoreMissing {
                        judge: kind,
                        criterion: criterion.name.to_string(),
                    });
                    0
                }
            };
            let score = RubricScore::clamped(criterion.name, raw, criterion.max);
            if raw > u64::from(score.value()) {
                self.events.record(EvalEvent::ScoreClamped {
                    judge: kind,
                    criterion: criterion.name.to_string(),
                    original: raw,
                    clamped: score.value(),
                });
            }
            scores.push(score);
        }

        let reasoning = object
            .get(def.reasoning_key)
            .and_then(Value::as_object)
            .map(|r| collect_reasoning(def, r))
            .unwrap_or_default();

        let result = JudgeResult::new(kind, self.model.model_id(), scores, reasoning, confidence);

        let reported_total = object.get(def.total_key).and_then(score_value);
        if reported_total != Some(u64::from(result.total())) {
            self.events.record(EvalEvent::TotalRecomputed {
                judge: kind,
                reported: reported_total,
                computed: result.total(),
            });
        }
        result
    }
}

/// Integer score from a sanitized leaf; numeric strings are accepted.
fn score_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let f = s.trim().parse::<f64>().ok().filter(|f| f.is_finite())?;
            Some(f.round().max(0.0) as u64)
        }
        _ => None,
    }
}

fn collect_reasoning(def: &JudgeDefinition, reasoning: &Map<String, Value>) -> JudgeReasoning {
    let narrative = def
        .narrative_fields
        .iter()
        .filter_map(|field| {
            reasoning
                .get(*field)
                .and_then(Value::as_str)
                .map(|text| (field.to_string(), text.trim().to_string()))
        })
        .collect();
    JudgeReasoning {
        narrative,
        strengths: string_list(reasoning.get(def.strengths_field)),
        gaps: string_list(reasoning.get(def.gaps_field)),
        improvements: string_list(reasoning.get(IMPROVEMENTS_FIELD)),
        risks: def
            .risks_field
            .map(|field| string_list(reasoning.get(field)))
            .unwrap_or_default(),
    }
}

/// Lists of strings; a lone string counts as a one-item list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v @ Value::String(_)) => vec![v],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
