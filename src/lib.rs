#![forbid(unsafe_code)]

//! # panel-harness
//!
//! Scores hackathon submissions with a panel of three LLM judges served by a
//! local model.
//!
//! Each judge (technical, product, execution) scores one axis against a fixed
//! rubric. Model output goes through a layered JSON recovery chain and a
//! two-step retry with a correction prompt; scores are clamped to the rubric
//! and totals recomputed. The aggregator maps every axis onto a shared
//! 140-point basis, drops judges that never produced parseable output,
//! rebalances the remaining weights and reports agreement and confidence.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod events;
pub mod gateway;
pub mod judge;
pub mod panel;
pub mod parse;
pub mod prompts;
pub mod report;
pub mod rubric;
pub mod submission;
pub mod telemetry;
pub mod text_budget;

pub use aggregate::{AggregateResult, Aggregator, AggregatorError, ConfidenceLevel, ScoreCategory};
pub use cache::{EvaluationCache, EvaluationCacheKey, SqliteEvaluationCache};
pub use config::{ConfigError, PanelConfig};
pub use events::{EvalEvent, EventSink, JsonlEventSink, MemoryEventSink, TracingEventSink};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use judge::{Judge, JudgeConfidence, JudgeError, JudgeResult};
pub use panel::{BatchOutcome, Panel, PanelError};
pub use parse::{parse_model_json, ParseStrategy};
pub use rubric::{JudgeKind, PerJudge, RubricScore};
pub use submission::{SubmissionContent, VisualAssessment};
