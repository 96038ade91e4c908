//! Two-step retry protocol around one judge prompt.
//!
//! ```text
//! FirstAttempt --parse fail--> CorrectionAttempt --parse fail--> Failed
//!      |                              |
//!   success: High                 success: Medium          Failed: Low
//! ```
//!
//! A backend that cannot be reached aborts the protocol with an error instead
//! of consuming the correction attempt.

use crate::events::{EvalEvent, EventSink};
use crate::gateway::{ChatGateway, ChatRequest, ProviderError};
use crate::parse::{parse_model_json, preview, ParseStrategy, ParsedResponse};
use crate::prompts::with_correction;
use crate::rubric::JudgeKind;

use super::JudgeConfidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    FirstAttempt,
    CorrectionAttempt,
    Failed,
}

impl RetryState {
    /// 1-based attempt number, `None` once failed.
    pub fn attempt(self) -> Option<u8> {
        match self {
            RetryState::FirstAttempt => Some(1),
            RetryState::CorrectionAttempt => Some(2),
            RetryState::Failed => None,
        }
    }

    /// Transition taken when an attempt yields no object.
    pub fn on_parse_failure(self) -> RetryState {
        match self {
            RetryState::FirstAttempt => RetryState::CorrectionAttempt,
            RetryState::CorrectionAttempt | RetryState::Failed => RetryState::Failed,
        }
    }

    /// Confidence earned by a success in this state.
    pub fn confidence(self) -> JudgeConfidence {
        match self {
            RetryState::FirstAttempt => JudgeConfidence::High,
            RetryState::CorrectionAttempt => JudgeConfidence::Medium,
            RetryState::Failed => JudgeConfidence::Low,
        }
    }

    fn prompt(self, base: &str) -> String {
        match self {
            RetryState::CorrectionAttempt => with_correction(base),
            _ => base.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub parsed: Option<ParsedResponse>,
    pub confidence: JudgeConfidence,
    pub attempts: u8,
}

impl RetryOutcome {
    pub fn strategy(&self) -> Option<ParseStrategy> {
        self.parsed.as_ref().map(|p| p.strategy)
    }
}

/// Drive the protocol. `build` turns prompt text into a request.
pub async fn run_with_correction(
    gateway: &dyn ChatGateway,
    judge: JudgeKind,
    base_prompt: &str,
    build: impl Fn(String) -> ChatRequest,
    events: &dyn EventSink,
) -> Result<RetryOutcome, ProviderError> {
    let mut state = RetryState::FirstAttempt;
    let mut attempts = 0u8;

    while let Some(attempt) = state.attempt() {
        attempts = attempt;
        let reason = match gateway.chat(build(state.prompt(base_prompt))).await {
            Ok(response) => match parse_model_json(&response.content) {
                Some(parsed) => {
                    if parsed.strategy != ParseStrategy::Direct {
                        events.record(EvalEvent::ParseRecovered {
                            judge,
                            attempt,
                            strategy: parsed.strategy,
                        });
                    }
                    return Ok(RetryOutcome {
                        parsed: Some(parsed),
                        confidence: state.confidence(),
                        attempts,
                    });
                }
                None => format!("unparseable output: {}", preview(&response.content, 200)),
            },
            Err(err) if err.is_backend_unavailable() => return Err(err),
            Err(err) => err.to_string(),
        };

        events.record(EvalEvent::AttemptFailed {
            judge,
            attempt,
            reason,
        });
        state = state.on_parse_failure();
        if state == RetryState::CorrectionAttempt {
            events.record(EvalEvent::RetryingWithCorrection { judge });
        }
    }

    Ok(RetryOutcome {
        parsed: None,
        confidence: RetryState::Failed.confidence(),
        attempts,
    })
}
