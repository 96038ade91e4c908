//! Submission inputs and the collaborator interfaces that produce them.
//!
//! Text extraction and visual scoring happen outside this crate; their
//! results arrive here as plain strings and numbers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything a judge sees. Immutable for one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionContent {
    pub problem_statement: String,
    /// Extracted slide text. Truncated per judge at prompt time.
    pub ppt_content: String,
    /// Short summary of the visual/layout assessment.
    pub visual_analysis: String,
}

impl SubmissionContent {
    pub fn new(
        problem_statement: impl Into<String>,
        ppt_content: impl Into<String>,
        visual_analysis: impl Into<String>,
    ) -> Self {
        Self {
            problem_statement: problem_statement.into(),
            ppt_content: ppt_content.into(),
            visual_analysis: visual_analysis.into(),
        }
    }
}

// =============================================================================
// Visual assessment
// =============================================================================

/// Output of the external visual scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAssessment {
    /// 0..=15.
    pub visual_score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
}

impl VisualAssessment {
    pub const MAX_SCORE: f64 = 15.0;
    const FEEDBACK_CHARS: usize = 100;

    /// Compact `Visual:<score>/15 <feedback>` summary passed to the judges.
    pub fn to_visual_analysis(&self) -> String {
        let score = if self.visual_score.is_finite() {
            self.visual_score.clamp(0.0, Self::MAX_SCORE)
        } else {
            0.0
        };
        let score = if score.fract() == 0.0 {
            format!("{}", score as u32)
        } else {
            format!("{score:.1}")
        };
        let feedback: String = self.feedback.chars().take(Self::FEEDBACK_CHARS).collect();
        format!("Visual:{score}/15 {feedback}").trim_end().to_string()
    }
}

// =============================================================================
// Extraction
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("submission {0} has neither inline content nor a document path")]
    MissingContent(String),
}

/// Maps a document path to its extracted text.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Reads already-extracted text files (`.txt`, `.md`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !matches!(ext.as_str(), "txt" | "md" | "text") {
            return Err(ExtractionError::Unsupported(path.display().to_string()));
        }
        std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

// =============================================================================
// Batch input
// =============================================================================

/// One row of a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub team: String,
    #[serde(default)]
    pub problem_statement: String,
    /// Inline extracted text; takes precedence over `document`.
    #[serde(default)]
    pub ppt_content: Option<String>,
    #[serde(default)]
    pub document: Option<PathBuf>,
    #[serde(default)]
    pub visual: Option<VisualAssessment>,
    /// Pre-rendered visual summary; used when `visual` is absent.
    #[serde(default)]
    pub visual_analysis: Option<String>,
}

impl BatchSubmission {
    pub fn resolve(
        &self,
        extractor: &dyn ContentExtractor,
    ) -> Result<SubmissionContent, ExtractionError> {
        let ppt_content = match (&self.ppt_content, &self.document) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => extractor.extract(path)?,
            (None, None) => return Err(ExtractionError::MissingContent(self.team.clone())),
        };
        let visual_analysis = match (&self.visual, &self.visual_analysis) {
            (Some(visual), _) => visual.to_visual_analysis(),
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        };
        Ok(SubmissionContent::new(
            self.problem_statement.clone(),
            ppt_content,
            visual_analysis,
        ))
    }
}
