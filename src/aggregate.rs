//! Consensus across the three judges.
//!
//! Raw totals are mapped onto a shared 140-point basis, low-confidence judges
//! are excluded and their weight mass redistributed, and the remaining spread
//! is turned into a disagreement reading and a confidence level.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{EvalEvent, EventSink, TracingEventSink};
use crate::judge::JudgeResult;
use crate::rubric::{JudgeKind, PerJudge, NORMALIZED_MAX};

/// Tolerance on the weight sum.
pub const WEIGHT_TOLERANCE: f64 = 0.01;

pub const DEFAULT_WEIGHTS: PerJudge<f64> = PerJudge {
    technical: 0.60,
    product: 0.25,
    execution: 0.15,
};

const MAX_STRENGTHS: usize = 5;
const MAX_WEAKNESSES: usize = 5;
const MAX_IMPROVEMENTS: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum AggregatorError {
    #[error("weights must sum to 1.0 (±{WEIGHT_TOLERANCE}), got {sum}")]
    InvalidWeights { sum: f64 },
    #[error("weight for {judge} must be a finite non-negative number, got {weight}")]
    InvalidWeight { judge: JudgeKind, weight: f64 },
}

// =============================================================================
// Result types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreCategory {
    #[serde(rename = "Non-competitive")]
    NonCompetitive,
    #[serde(rename = "Weak / Major Gaps")]
    Weak,
    #[serde(rename = "Average / Needs Refinement")]
    Average,
    #[serde(rename = "Strong Contender")]
    StrongContender,
    #[serde(rename = "Top-tier / Likely Winner")]
    TopTier,
}

impl ScoreCategory {
    pub fn from_score(final_score: f64) -> Self {
        match final_score {
            s if s >= 120.0 => ScoreCategory::TopTier,
            s if s >= 100.0 => ScoreCategory::StrongContender,
            s if s >= 75.0 => ScoreCategory::Average,
            s if s >= 50.0 => ScoreCategory::Weak,
            _ => ScoreCategory::NonCompetitive,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreCategory::TopTier => "Top-tier / Likely Winner",
            ScoreCategory::StrongContender => "Strong Contender",
            ScoreCategory::Average => "Average / Needs Refinement",
            ScoreCategory::Weak => "Weak / Major Gaps",
            ScoreCategory::NonCompetitive => "Non-competitive",
        }
    }
}

impl fmt::Display for ScoreCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered from least to most confident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    High,
}

impl ConfidenceLevel {
    pub fn label(self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::MediumHigh => "Medium-High",
            ConfidenceLevel::High => "High",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceAnalysis {
    pub variance: f64,
    pub std_dev: f64,
    pub max_difference: f64,
    pub high_disagreement: bool,
    #[serde(rename = "disagreement_interpretation")]
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub percentage: u8,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedInsights {
    pub top_strengths: Vec<String>,
    pub critical_weaknesses: Vec<String>,
    pub priority_improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// 0..=140, one decimal.
    pub final_score: f64,
    pub max_score: u32,
    pub score_category: ScoreCategory,
    /// Normalized per-axis scores (84 / 35 / 21 maxima), one decimal.
    pub judge_scores: PerJudge<f64>,
    /// Raw rubric totals; zero for excluded judges.
    pub raw_judge_scores: PerJudge<u32>,
    /// Rebalanced weights of the valid judges.
    pub weights_used: BTreeMap<JudgeKind, f64>,
    pub variance_analysis: VarianceAnalysis,
    pub confidence: Confidence,
    pub aggregated_insights: AggregatedInsights,
    pub excluded_judges: Vec<JudgeKind>,
    pub judge_details: PerJudge<JudgeResult>,
}

// =============================================================================
// Aggregator
// =============================================================================

pub struct Aggregator {
    weights: PerJudge<f64>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            events: Arc::new(TracingEventSink),
        }
    }
}

impl Aggregator {
    /// Fails unless every weight is finite and non-negative and they sum to 1.0.
    pub fn new(weights: PerJudge<f64>) -> Result<Self, AggregatorError> {
        for (judge, &weight) in weights.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AggregatorError::InvalidWeight { judge, weight });
            }
        }
        let sum: f64 = weights.iter().map(|(_, w)| *w).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AggregatorError::InvalidWeights { sum });
        }
        Ok(Self {
            weights,
            ..Self::default()
        })
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn weights(&self) -> &PerJudge<f64> {
        &self.weights
    }

    pub fn aggregate(&self, results: PerJudge<JudgeResult>) -> AggregateResult {
        let excluded: Vec<JudgeKind> = results
            .iter()
            .filter(|(_, r)| r.is_low_confidence())
            .map(|(kind, _)| kind)
            .collect();
        for &judge in &excluded {
            self.events.record(EvalEvent::JudgeExcluded { judge });
        }
        let is_valid = |kind: JudgeKind| !excluded.contains(&kind);

        let raw = results.map(|kind, r| if is_valid(kind) { r.total() } else { 0 });
        let normalized = raw.map(|kind, &total| kind.normalize(total));
        let weights_used = self.rebalance(&excluded);

        let final_score: f64 = weights_used
            .iter()
            .map(|(&kind, &w)| {
                let max = f64::from(kind.rubric().max_total());
                f64::from(*raw.get(kind)) / max * NORMALIZED_MAX * w
            })
            .sum();

        let valid_scores: Vec<f64> = JudgeKind::ALL
            .into_iter()
            .filter(|&k| is_valid(k))
            .map(|k| *normalized.get(k))
            .collect();
        let spread = Spread::of(&valid_scores);

        let variance_analysis = VarianceAnalysis {
            variance: round_to(spread.variance, 2),
            std_dev: round_to(spread.std_dev, 2),
            max_difference: round_to(spread.max_difference, 2),
            high_disagreement: spread.std_dev > 0.15 * spread.mean,
            interpretation: interpret_disagreement(&normalized).to_string(),
        };
        let confidence = estimate_confidence(&spread, &excluded);

        let final_score = round_to(final_score, 1);
        let score_category = ScoreCategory::from_score(final_score);
        let aggregated_insights = compile_insights(&results);

        self.events.record(EvalEvent::AggregateCompleted {
            final_score,
            category: score_category.label().to_string(),
            excluded: excluded.len(),
        });

        AggregateResult {
            final_score,
            max_score: NORMALIZED_MAX as u32,
            score_category,
            judge_scores: normalized.map(|_, &s| round_to(s, 1)),
            raw_judge_scores: raw,
            weights_used,
            variance_analysis,
            confidence,
            aggregated_insights,
            excluded_judges: excluded,
            judge_details: results,
        }
    }

    /// Renormalize the weights of valid judges to sum to 1.0.
    fn rebalance(&self, excluded: &[JudgeKind]) -> BTreeMap<JudgeKind, f64> {
        let valid: Vec<(JudgeKind, f64)> = self
            .weights
            .iter()
            .filter(|(kind, _)| !excluded.contains(kind))
            .map(|(kind, &w)| (kind, w))
            .collect();
        let mass: f64 = valid.iter().map(|(_, w)| w).sum();
        if mass <= 0.0 {
            return BTreeMap::new();
        }
        valid.into_iter().map(|(kind, w)| (kind, w / mass)).collect()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Spread {
    mean: f64,
    variance: f64,
    std_dev: f64,
    max_difference: f64,
}

impl Spread {
    /// Population statistics; fewer than two values have no spread.
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        if values.len() < 2 {
            return Self {
                mean,
                ..Self::default()
            };
        }
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        Self {
            mean,
            variance,
            std_dev: variance.sqrt(),
            max_difference: max - min,
        }
    }
}

/// First matching pattern over the normalized scores.
fn interpret_disagreement(normalized: &PerJudge<f64>) -> &'static str {
    let (tech, prod, exec) = (normalized.technical, normalized.product, normalized.execution);
    if tech > prod + 10.0 && tech > exec + 10.0 {
        "Strong engineering but weak business positioning"
    } else if prod > tech + 10.0 {
        "Marketing-heavy but technically shallow"
    } else if exec > tech + 5.0 && exec > prod + 5.0 {
        "Built something workable but concept may be weak"
    } else if tech < 20.0 && prod < 15.0 && exec < 10.0 {
        "Consensus: Weak across all dimensions"
    } else if tech > 60.0 && prod > 25.0 && exec > 15.0 {
        "Strong agreement: High quality submission"
    } else {
        "Balanced evaluation across judges"
    }
}

fn estimate_confidence(spread: &Spread, excluded: &[JudgeKind]) -> Confidence {
    let (mut level, mut percentage) = if spread.std_dev < spread.mean * 0.10 {
        (ConfidenceLevel::High, 90u8)
    } else if spread.std_dev < spread.mean * 0.15 {
        (ConfidenceLevel::MediumHigh, 75)
    } else if spread.std_dev < spread.mean * 0.25 {
        (ConfidenceLevel::Medium, 60)
    } else {
        (ConfidenceLevel::Low, 40)
    };

    let agreement = if spread.mean > 0.0 {
        100 - (spread.std_dev / spread.mean * 100.0) as i64
    } else {
        0
    };
    let mut reasoning = format!("Judge agreement: {agreement}%");

    if !excluded.is_empty() {
        level = if excluded.len() >= 2 {
            ConfidenceLevel::Low
        } else {
            level.min(ConfidenceLevel::Medium)
        };
        let penalty = 20u8.saturating_mul(excluded.len() as u8);
        percentage = percentage.saturating_sub(penalty).max(20);
        let names: Vec<&str> = excluded.iter().map(|k| k.as_str()).collect();
        reasoning.push_str(&format!("; excluded judges: {}", names.join(", ")));
    }

    Confidence {
        level,
        percentage,
        reasoning,
    }
}

/// Strengths, weaknesses and improvements in technical, product, execution order.
fn compile_insights(results: &PerJudge<JudgeResult>) -> AggregatedInsights {
    let mut insights = AggregatedInsights::default();
    for (_, result) in results.iter() {
        let reasoning = &result.reasoning;
        insights.top_strengths.extend(reasoning.strengths.iter().cloned());
        insights.critical_weaknesses.extend(reasoning.gaps.iter().cloned());
        insights
            .priority_improvements
            .extend(reasoning.improvements.iter().cloned());
    }
    insights.top_strengths.truncate(MAX_STRENGTHS);
    insights.critical_weaknesses.truncate(MAX_WEAKNESSES);
    insights.priority_improvements.truncate(MAX_IMPROVEMENTS);
    insights
}

/// Round half away from zero to `digits` decimals.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

// =============================================================================
// TESTS
// =============================================================================
