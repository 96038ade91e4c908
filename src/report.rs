//! Human-readable rendering of panel results.

use serde::Serialize;

use crate::aggregate::{round_to, AggregateResult};
use crate::panel::BatchOutcome;
use crate::rubric::{JudgeKind, NORMALIZED_MAX};

const REASON_CHARS: usize = 100;

pub fn render_report_markdown(result: &AggregateResult, team: Option<&str>) -> String {
    let mut out = String::new();
    match team {
        Some(team) => out.push_str(&format!("# Evaluation Report: {team}\n\n")),
        None => out.push_str("# Evaluation Report\n\n"),
    }
    out.push_str(&format!(
        "- Final score: {:.1} / {}\n",
        result.final_score, result.max_score
    ));
    out.push_str(&format!("- Category: {}\n", result.score_category));
    out.push_str(&format!(
        "- Confidence: {} ({}%) ({})\n",
        result.confidence.level, result.confidence.percentage, result.confidence.reasoning
    ));
    if !result.excluded_judges.is_empty() {
        let names: Vec<&str> = result.excluded_judges.iter().map(|k| k.as_str()).collect();
        out.push_str(&format!("- Excluded judges: {}\n", names.join(", ")));
    }

    out.push_str("\n## Judges\n\n");
    out.push_str("| Judge | Raw | Normalized | Weight | Confidence |\n");
    out.push_str("|---|---|---|---|---|\n");
    for (kind, detail) in result.judge_details.iter() {
        let weight = result
            .weights_used
            .get(&kind)
            .map(|w| format!("{w:.3}"))
            .unwrap_or_else(|| "excluded".to_string());
        out.push_str(&format!(
            "| {} | {}/{} | {:.1}/{:.0} | {} | {:?} |\n",
            detail.agent,
            result.raw_judge_scores.get(kind),
            detail.max_total(),
            result.judge_scores.get(kind),
            kind.normalized_max(),
            weight,
            detail.judge_confidence,
        ));
    }

    let variance = &result.variance_analysis;
    out.push_str("\n## Agreement\n\n");
    out.push_str(&format!(
        "- Std dev: {:.2} (variance {:.2}, max difference {:.2})\n",
        variance.std_dev, variance.variance, variance.max_difference
    ));
    out.push_str(&format!(
        "- High disagreement: {}\n",
        if variance.high_disagreement { "yes" } else { "no" }
    ));
    out.push_str(&format!("- Reading: {}\n", variance.interpretation));

    let insights = &result.aggregated_insights;
    push_list(&mut out, "Strengths", &insights.top_strengths);
    push_list(&mut out, "Weaknesses", &insights.critical_weaknesses);
    push_list(&mut out, "Improvements", &insights.priority_improvements);
    out
}

fn push_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {title}\n\n"));
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
}

// =============================================================================
// Leaderboard
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub team: String,
    /// Final score rescaled to 100.
    pub total_score: f64,
    /// Axis scores rescaled to their weight share (60 / 25 / 15).
    pub technical_score: f64,
    pub product_score: f64,
    pub execution_score: f64,
    pub category: Option<String>,
    pub confidence: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Rank outcomes by score; failed rows score zero and sort last.
    pub fn from_outcomes(outcomes: &[BatchOutcome]) -> Self {
        let mut entries: Vec<LeaderboardEntry> = outcomes.iter().map(entry_for).collect();
        entries.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
        for (idx, entry) in entries.iter_mut().enumerate() {
            entry.rank = idx + 1;
        }
        Self { entries }
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::from("# Leaderboard\n\n");
        out.push_str("| Rank | Team | Total /100 | Technical /60 | Product /25 | Execution /15 | Category | Reason |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for e in &self.entries {
            out.push_str(&format!(
                "| {} | {} | {:.1} | {:.1} | {:.1} | {:.1} | {} | {} |\n",
                e.rank,
                e.team,
                e.total_score,
                e.technical_score,
                e.product_score,
                e.execution_score,
                e.category.as_deref().unwrap_or("-"),
                e.reason.replace('|', "/"),
            ));
        }
        out
    }
}

fn entry_for(outcome: &BatchOutcome) -> LeaderboardEntry {
    let Some(result) = &outcome.result else {
        return LeaderboardEntry {
            rank: 0,
            team: outcome.team.clone(),
            total_score: 0.0,
            technical_score: 0.0,
            product_score: 0.0,
            execution_score: 0.0,
            category: None,
            confidence: None,
            reason: "Evaluation failed".to_string(),
        };
    };

    // Back from the normalized axis maximum to the axis's 100-point share.
    let share = |kind: JudgeKind| {
        let max = kind.normalized_max();
        round_to(result.judge_scores.get(kind) / max * (max / NORMALIZED_MAX * 100.0), 1)
    };
    let reason = match result.aggregated_insights.top_strengths.first() {
        Some(strength) => strength.chars().take(REASON_CHARS).collect(),
        None => result.score_category.label().to_string(),
    };

    LeaderboardEntry {
        rank: 0,
        team: outcome.team.clone(),
        total_score: round_to(result.final_score / NORMALIZED_MAX * 100.0, 1),
        technical_score: share(JudgeKind::Technical),
        product_score: share(JudgeKind::Product),
        execution_score: share(JudgeKind::Execution),
        category: Some(result.score_category.label().to_string()),
        confidence: Some(result.confidence.level.label().to_string()),
        reason,
    }
}
