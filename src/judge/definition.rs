//! Data-driven judge definitions.
//!
//! A judge is a value, not a type: the rubric, prompt template and the JSON
//! keys of its output schema. One engine ([`super::Judge`]) interprets all three.

use crate::prompts::{PromptTemplate, EXECUTION_PROMPT, PRODUCT_PROMPT, TECHNICAL_PROMPT};
use crate::rubric::{JudgeKind, Rubric};

#[derive(Debug, Clone, Copy)]
pub struct JudgeDefinition {
    pub kind: JudgeKind,
    /// Human-readable agent name attached to every result.
    pub agent: &'static str,
    /// Attribution caller for usage records.
    pub caller: &'static str,
    pub template: PromptTemplate,
    /// Object holding one integer per rubric criterion.
    pub scores_key: &'static str,
    /// Self-reported total. Read only for diagnostics.
    pub total_key: &'static str,
    /// Object holding narrative strings and lists.
    pub reasoning_key: &'static str,
    pub narrative_fields: &'static [&'static str],
    pub strengths_field: &'static str,
    pub gaps_field: &'static str,
    pub risks_field: Option<&'static str>,
}

/// Shared by all three schemas.
pub const IMPROVEMENTS_FIELD: &str = "improvements";

pub const TECHNICAL_JUDGE: JudgeDefinition = JudgeDefinition {
    kind: JudgeKind::Technical,
    agent: "Technical Judge",
    caller: "judge::technical",
    template: TECHNICAL_PROMPT,
    scores_key: "technical_scores",
    total_key: "total_technical_score",
    reasoning_key: "technical_reasoning",
    narrative_fields: &[
        "architecture_analysis",
        "algorithm_analysis",
        "scalability_assessment",
    ],
    strengths_field: "technical_strengths",
    gaps_field: "critical_gaps",
    risks_field: None,
};

pub const PRODUCT_JUDGE: JudgeDefinition = JudgeDefinition {
    kind: JudgeKind::Product,
    agent: "Product & Innovation Judge",
    caller: "judge::product",
    template: PRODUCT_PROMPT,
    scores_key: "product_scores",
    total_key: "total_product_score",
    reasoning_key: "product_reasoning",
    narrative_fields: &[
        "problem_assessment",
        "innovation_analysis",
        "market_analysis",
        "differentiation_summary",
    ],
    strengths_field: "product_strengths",
    gaps_field: "product_gaps",
    risks_field: None,
};

pub const EXECUTION_JUDGE: JudgeDefinition = JudgeDefinition {
    kind: JudgeKind::Execution,
    agent: "Execution & Feasibility Judge",
    caller: "judge::execution",
    template: EXECUTION_PROMPT,
    scores_key: "execution_scores",
    total_key: "total_execution_score",
    reasoning_key: "execution_reasoning",
    narrative_fields: &["deployment_assessment", "demo_analysis", "feasibility_summary"],
    strengths_field: "execution_strengths",
    gaps_field: "practical_concerns",
    risks_field: Some("risk_factors"),
};

impl JudgeDefinition {
    pub fn for_kind(kind: JudgeKind) -> &'static JudgeDefinition {
        match kind {
            JudgeKind::Technical => &TECHNICAL_JUDGE,
            JudgeKind::Product => &PRODUCT_JUDGE,
            JudgeKind::Execution => &EXECUTION_JUDGE,
        }
    }

    pub fn rubric(&self) -> &'static Rubric {
        self.kind.rubric()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_mention_their_schema_keys() {
        for kind in JudgeKind::ALL {
            let def = JudgeDefinition::for_kind(kind);
            assert_eq!(def.kind, kind);
            let body = def.template.body;
            assert!(body.contains(def.scores_key));
            assert!(body.contains(def.total_key));
            assert!(body.contains(def.reasoning_key));
            assert!(body.contains(def.strengths_field));
            assert!(body.contains(def.gaps_field));
            for field in def.narrative_fields {
                assert!(body.contains(field), "{kind}: {field}");
            }
        }
    }
}
