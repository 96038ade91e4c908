//! Prompt templates for the three judge roles.
//!
//! Each template carries the role description, the rubric with its point
//! ranges and the exact output schema. Placeholders `{problem_statement}`,
//! `{ppt_content}` and `{visual_analysis}` are substituted at render time.

use once_cell::sync::Lazy;

use crate::rubric::JudgeKind;
use crate::text_budget::{truncate_chars, truncate_to_tokens, ContentBudget};

/// Appended to every judge prompt.
pub const STRICT_JSON_CONTRACT: &str = r#"

OUTPUT CONTRACT: this response is consumed by a JSON parser inside an automated scoring pipeline. Anything that is not valid JSON is discarded and the submission loses every point from you.
- Respond with ONE JSON object and nothing else.
- No markdown, no code fences, no headings, no commentary.
- The first character must be { and the last character must be }.
- Every score is a non-negative integer. No decimals, no nulls.
- Use exactly the fields of the schema above: none missing, none added."#;

/// Appended to the original prompt for the second attempt.
pub const CORRECTION_PROMPT: &str = "Your previous answer could not be parsed as JSON. \
Reply again with ONLY the JSON object in the exact schema requested: no prose, no markdown, \
starting with { and ending with }.";

/// A judge prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub body: &'static str,
}

impl PromptTemplate {
    /// Substitute the (already truncated) submission fields.
    pub fn render(&self, problem_statement: &str, ppt_content: &str, visual_analysis: &str) -> String {
        let body = fill_placeholders(
            self.body,
            &[
                ("{problem_statement}", problem_statement.trim()),
                ("{ppt_content}", ppt_content.trim()),
                ("{visual_analysis}", visual_analysis.trim()),
            ],
        );
        format!("{}{}", body.trim(), STRICT_JSON_CONTRACT)
    }

    /// Truncate each field to its budget, then render.
    pub fn render_with_budget(
        &self,
        problem_statement: &str,
        ppt_content: &str,
        visual_analysis: &str,
        budget: &ContentBudget,
    ) -> String {
        self.render(
            &truncate_to_tokens(problem_statement, budget.problem_tokens),
            &truncate_to_tokens(ppt_content, budget.content_tokens),
            &truncate_chars(visual_analysis, budget.visual_chars),
        )
    }
}

/// Single pass over `template`: substituted text is never rescanned.
fn fill_placeholders(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match fields.iter().find(|(placeholder, _)| tail.starts_with(placeholder)) {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// The prompt used for the correction attempt.
pub fn with_correction(prompt: &str) -> String {
    format!("{prompt}\n\n{CORRECTION_PROMPT}")
}

// =============================================================================
// Judge templates
// =============================================================================

pub const TECHNICAL_PROMPT: PromptTemplate = PromptTemplate {
    slug: "technical_v1",
    body: r#"You are the TECHNICAL judge of a hackathon panel. You are an experienced systems architect.
Focus: technical depth and engineering quality. Penalize missing technical explanation; ignore marketing language.

SUBMISSION
Problem: {problem_statement}
Content: {ppt_content}
Visuals: {visual_analysis}

RUBRIC (60 points)
1. architecture_quality (0-30): separation of components and responsibilities (0-8), scalability to 10x load (0-8), fit and maturity of the technology stack (0-7), coherence of integrations, APIs and data flow (0-7).
2. algorithm_justification (0-15): which algorithms or models are used, why over alternatives, baselines, complexity.
3. trade_offs (0-10): speed vs accuracy, cost vs performance, simplicity vs flexibility.
4. engineering_realism (0-5): real understanding rather than buzzwords, edge cases addressed.

CALIBRATION
- UI only, no backend: at most 15
- Basic architecture without reasoning: 16-35
- Detailed design with trade-offs: 36-50
- Production-grade architecture with justification: 51-60

SCHEMA
{"technical_scores":{"architecture_quality":0,"algorithm_justification":0,"trade_offs":0,"engineering_realism":0},"total_technical_score":0,"technical_reasoning":{"architecture_analysis":"","algorithm_analysis":"","scalability_assessment":"","critical_gaps":[],"technical_strengths":[],"improvements":[]}}

Be strict. Vague technical claims score low."#,
};

pub const PRODUCT_PROMPT: PromptTemplate = PromptTemplate {
    slug: "product_v1",
    body: r#"You are the PRODUCT & INNOVATION judge of a hackathon panel. You are a product strategist.
Focus: problem framing, market clarity, differentiation. Penalize vague impact claims; ignore algorithm detail unless it creates differentiation.

SUBMISSION
Problem: {problem_statement}
Content: {ppt_content}
Visuals: {visual_analysis}

RUBRIC (60 points)
1. problem_definition (0-20): clarity and specificity backed by data (0-8), identified target users and market size (0-6), evidence of a gap in existing solutions (0-6).
2. solution_innovation (0-25): solution maps to the stated problem (0-10), differentiation from alternatives (0-10), novelty of the approach or business model (0-5).
3. market_potential (0-15): scale of impact (0-6), revenue model and cost realism (0-5), go-to-market and adoption barriers (0-4).

CALIBRATION
- Generic problem, no data: at most 15
- Some clarity, weak differentiation: 16-35
- Clear problem with strong differentiation: 36-50
- Exceptional market insight with a defensible moat: 51-60

SCHEMA
{"product_scores":{"problem_definition":0,"solution_innovation":0,"market_potential":0},"total_product_score":0,"product_reasoning":{"problem_assessment":"","innovation_analysis":"","market_analysis":"","differentiation_summary":"","product_strengths":[],"product_gaps":[],"improvements":[]}}

Reward specific, defensible positioning."#,
};

pub const EXECUTION_PROMPT: PromptTemplate = PromptTemplate {
    slug: "execution_v1",
    body: r#"You are the EXECUTION & FEASIBILITY judge of a hackathon panel. You have shipped many products.
Focus: deployment realism, MVP completeness, demo quality. Penalize theory-only systems; a working prototype beats a perfect plan.

SUBMISSION
Problem: {problem_statement}
Content: {ppt_content}
Visuals: {visual_analysis}

RUBRIC (40 points)
1. implementation_feasibility (0-15): deployment plan and infrastructure (0-6), realistic buildable stack (0-4), awareness of infrastructure and API costs (0-3), MVP scope fits the hackathon (0-2).
2. demo_quality (0-20): the demo actually works beyond mockups (0-8), end-to-end workflow is clear (0-6), key technical challenges are demonstrated (0-6).
3. execution_risks (0-5): integration risks, edge cases, fallbacks and testing are identified.

CALIBRATION
- Pure theory, no demo: at most 10
- Mockups only, vague deployment: 11-20
- Working prototype, partial deployment plan: 21-30
- Complete demo and realistic deployment: 31-40

SCHEMA
{"execution_scores":{"implementation_feasibility":0,"demo_quality":0,"execution_risks":0},"total_execution_score":0,"execution_reasoning":{"deployment_assessment":"","demo_analysis":"","feasibility_summary":"","risk_factors":[],"execution_strengths":[],"practical_concerns":[],"improvements":[]}}

Reward working demos. Penalize hand-waving."#,
};

pub fn prompt_for(kind: JudgeKind) -> PromptTemplate {
    match kind {
        JudgeKind::Technical => TECHNICAL_PROMPT,
        JudgeKind::Product => PRODUCT_PROMPT,
        JudgeKind::Execution => EXECUTION_PROMPT,
    }
}

static TEMPLATE_HASH: Lazy<String> = Lazy::new(|| {
    let mut hasher = blake3::Hasher::new();
    for kind in JudgeKind::ALL {
        let template = prompt_for(kind);
        hasher.update(template.slug.as_bytes());
        hasher.update(b"|");
        hasher.update(template.body.as_bytes());
        hasher.update(b"|");
    }
    hasher.update(STRICT_JSON_CONTRACT.as_bytes());
    hasher.update(b"|");
    hasher.update(CORRECTION_PROMPT.as_bytes());
    hasher.finalize().to_hex().to_string()
});

/// Hash over every judge template and both contracts; part of the cache key.
pub fn panel_template_hash() -> &'static str {
    &TEMPLATE_HASH
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_every_placeholder() {
        for kind in JudgeKind::ALL {
            let p = prompt_for(kind).render("Flood alerts", "Slide text", "Visual:12/15 clean");
            assert!(p.contains("Problem: Flood alerts"));
            assert!(p.contains("Content: Slide text"));
            assert!(p.contains("Visuals: Visual:12/15 clean"));
            assert!(!p.contains("{problem_statement}"));
            assert!(p.ends_with(STRICT_JSON_CONTRACT));
        }
    }

    #[test]
    fn placeholder_text_inside_submission_is_kept_verbatim() {
        let p = TECHNICAL_PROMPT.render(
            "Problem mentions {ppt_content} literally",
            "SLIDES {visual_analysis}",
            "Visual:9/15 {problem_statement}",
        );
        assert!(p.contains("Problem: Problem mentions {ppt_content} literally"));
        assert!(p.contains("Content: SLIDES {visual_analysis}"));
        assert!(p.contains("Visuals: Visual:9/15 {problem_statement}"));
        // Schema braces survive untouched.
        assert!(p.contains("{\"technical_scores\":{"));
    }

    #[test]
    fn schemas_name_every_rubric_criterion() {
        for kind in JudgeKind::ALL {
            let body = prompt_for(kind).body;
            for criterion in kind.rubric().criteria {
                assert!(
                    body.contains(&format!("\"{}\":0", criterion.name)),
                    "{kind} schema is missing {}",
                    criterion.name
                );
            }
        }
    }

    #[test]
    fn budget_truncates_content() {
        let budget = ContentBudget {
            problem_tokens: 256,
            content_tokens: 10,
            visual_chars: 5,
        };
        let long = "sensor ".repeat(500);
        let p = TECHNICAL_PROMPT.render_with_budget("Problem", &long, "Visual:9/15 busy", &budget);
        assert!(!p.contains(long.trim()));
        assert!(p.contains("Visuals: Visua\n"));
    }

    #[test]
    fn correction_is_appended() {
        let p = with_correction("base prompt");
        assert!(p.starts_with("base prompt\n\n"));
        assert!(p.ends_with(CORRECTION_PROMPT));
    }

    #[test]
    fn template_hash_is_stable() {
        assert_eq!(panel_template_hash(), panel_template_hash());
        assert_eq!(panel_template_hash().len(), 64);
    }
}
