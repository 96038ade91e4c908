//! Judge roles, rubric tables and per-judge containers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Points available on the shared normalized basis.
pub const NORMALIZED_MAX: f64 = 140.0;

/// The three scoring axes, in fixed processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeKind {
    Technical,
    Product,
    Execution,
}

impl JudgeKind {
    pub const ALL: [JudgeKind; 3] = [JudgeKind::Technical, JudgeKind::Product, JudgeKind::Execution];

    pub fn as_str(self) -> &'static str {
        match self {
            JudgeKind::Technical => "technical",
            JudgeKind::Product => "product",
            JudgeKind::Execution => "execution",
        }
    }

    /// Fixed rubric for this axis.
    pub fn rubric(self) -> &'static Rubric {
        match self {
            JudgeKind::Technical => &TECHNICAL_RUBRIC,
            JudgeKind::Product => &PRODUCT_RUBRIC,
            JudgeKind::Execution => &EXECUTION_RUBRIC,
        }
    }

    /// Share of the 140-point basis this axis occupies (84 / 35 / 21).
    pub fn normalized_max(self) -> f64 {
        match self {
            JudgeKind::Technical => 84.0,
            JudgeKind::Product => 35.0,
            JudgeKind::Execution => 21.0,
        }
    }

    /// Map a raw rubric total onto the shared 140-point basis.
    pub fn normalize(self, raw_total: u32) -> f64 {
        let max = self.rubric().max_total() as f64;
        if max == 0.0 {
            return 0.0;
        }
        raw_total as f64 / max * self.normalized_max()
    }
}

impl fmt::Display for JudgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rubrics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Criterion {
    pub name: &'static str,
    pub max: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Rubric {
    pub criteria: &'static [Criterion],
}

impl Rubric {
    pub fn max_total(&self) -> u32 {
        self.criteria.iter().map(|c| c.max).sum()
    }
}

pub const TECHNICAL_RUBRIC: Rubric = Rubric {
    criteria: &[
        Criterion {
            name: "architecture_quality",
            max: 30,
        },
        Criterion {
            name: "algorithm_justification",
            max: 15,
        },
        Criterion {
            name: "trade_offs",
            max: 10,
        },
        Criterion {
            name: "engineering_realism",
            max: 5,
        },
    ],
};

pub const PRODUCT_RUBRIC: Rubric = Rubric {
    criteria: &[
        Criterion {
            name: "problem_definition",
            max: 20,
        },
        Criterion {
            name: "solution_innovation",
            max: 25,
        },
        Criterion {
            name: "market_potential",
            max: 15,
        },
    ],
};

pub const EXECUTION_RUBRIC: Rubric = Rubric {
    criteria: &[
        Criterion {
            name: "implementation_feasibility",
            max: 15,
        },
        Criterion {
            name: "demo_quality",
            max: 20,
        },
        Criterion {
            name: "execution_risks",
            max: 5,
        },
    ],
};

// =============================================================================
// Rubric scores
// =============================================================================

/// A named sub-score. `value <= max` holds for every constructed instance,
/// including deserialized ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RubricScoreRepr")]
pub struct RubricScore {
    name: String,
    value: u32,
    max: u32,
}

#[derive(Deserialize)]
struct RubricScoreRepr {
    name: String,
    value: u64,
    max: u32,
}

impl From<RubricScoreRepr> for RubricScore {
    fn from(repr: RubricScoreRepr) -> Self {
        RubricScore::clamped(repr.name, repr.value, repr.max)
    }
}

impl RubricScore {
    /// Build a score, clamping `raw` into `[0, max]`.
    pub fn clamped(name: impl Into<String>, raw: u64, max: u32) -> Self {
        Self {
            name: name.into(),
            value: raw.min(max as u64) as u32,
            max,
        }
    }

    pub fn zero(criterion: &Criterion) -> Self {
        Self::clamped(criterion.name, 0, criterion.max)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

// =============================================================================
// Per-judge container
// =============================================================================

/// One value per judge axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerJudge<T> {
    pub technical: T,
    pub product: T,
    pub execution: T,
}

impl<T> PerJudge<T> {
    pub fn new(technical: T, product: T, execution: T) -> Self {
        Self {
            technical,
            product,
            execution,
        }
    }

    pub fn get(&self, kind: JudgeKind) -> &T {
        match kind {
            JudgeKind::Technical => &self.technical,
            JudgeKind::Product => &self.product,
            JudgeKind::Execution => &self.execution,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(JudgeKind, &T) -> U) -> PerJudge<U> {
        PerJudge {
            technical: f(JudgeKind::Technical, &self.technical),
            product: f(JudgeKind::Product, &self.product),
            execution: f(JudgeKind::Execution, &self.execution),
        }
    }

    /// Iterate in the fixed order technical, product, execution.
    pub fn iter(&self) -> impl Iterator<Item = (JudgeKind, &T)> {
        JudgeKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rubric_totals_match_axis_maxima() {
        assert_eq!(TECHNICAL_RUBRIC.max_total(), 60);
        assert_eq!(PRODUCT_RUBRIC.max_total(), 60);
        assert_eq!(EXECUTION_RUBRIC.max_total(), 40);
    }

    #[test]
    fn normalized_maxima_sum_to_basis() {
        let sum: f64 = JudgeKind::ALL.iter().map(|k| k.normalize(k.rubric().max_total())).sum();
        assert!((sum - NORMALIZED_MAX).abs() < 1e-9);
        assert!((JudgeKind::Product.normalize(30) - 17.5).abs() < 1e-9);
    }

    #[test]
    fn rubric_score_clamps_on_construction_and_deserialization() {
        let s = RubricScore::clamped("trade_offs", 99, 10);
        assert_eq!(s.value(), 10);

        let parsed: RubricScore =
            serde_json::from_str(r#"{"name":"trade_offs","value":42,"max":10}"#).unwrap();
        assert_eq!(parsed.value(), 10);
    }

    #[test]
    fn per_judge_iterates_in_fixed_order() {
        let p = PerJudge::new(1, 2, 3);
        let order: Vec<JudgeKind> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(order, JudgeKind::ALL.to_vec());
        assert_eq!(*p.map(|_, v| v * 10).get(JudgeKind::Execution), 30);
    }
}
