//! Structured diagnostics emitted by judges, the aggregator and the panel.
//!
//! Components receive an [`EventSink`] instead of printing, so callers can
//! forward events to `tracing`, capture them for assertions, or persist them
//! as JSON lines.

use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex};

use crate::judge::JudgeConfidence;
use crate::parse::ParseStrategy;
use crate::rubric::JudgeKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EvalEvent {
    JudgeStarted {
        judge: JudgeKind,
    },
    /// One model call produced no usable object.
    AttemptFailed {
        judge: JudgeKind,
        attempt: u8,
        reason: String,
    },
    RetryingWithCorrection {
        judge: JudgeKind,
    },
    ParseRecovered {
        judge: JudgeKind,
        attempt: u8,
        strategy: ParseStrategy,
    },
    ScoreClamped {
        judge: JudgeKind,
        criterion: String,
        original: u64,
        clamped: u32,
    },
    ScoreMissing {
        judge: JudgeKind,
        criterion: String,
    },
    TotalRecomputed {
        judge: JudgeKind,
        reported: Option<u64>,
        computed: u32,
    },
    JudgeDefaulted {
        judge: JudgeKind,
    },
    JudgeCompleted {
        judge: JudgeKind,
        total: u32,
        max_total: u32,
        confidence: JudgeConfidence,
    },
    JudgeExcluded {
        judge: JudgeKind,
    },
    AggregateCompleted {
        final_score: f64,
        category: String,
        excluded: usize,
    },
    CacheHit {
        key_hash: String,
    },
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: EvalEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: EvalEvent) {
        match &event {
            EvalEvent::AttemptFailed {
                judge,
                attempt,
                reason,
            } => tracing::warn!(%judge, attempt, %reason, "judge attempt failed"),
            EvalEvent::ScoreClamped {
                judge,
                criterion,
                original,
                clamped,
            } => tracing::warn!(%judge, %criterion, original, clamped, "score clamped"),
            EvalEvent::ScoreMissing { judge, criterion } => {
                tracing::warn!(%judge, %criterion, "score missing; defaulted to 0")
            }
            EvalEvent::JudgeDefaulted { judge } => {
                tracing::warn!(%judge, "judge produced no parseable output; using default result")
            }
            EvalEvent::JudgeExcluded { judge } => {
                tracing::warn!(%judge, "judge excluded from weighting")
            }
            EvalEvent::JudgeCompleted {
                judge,
                total,
                max_total,
                confidence,
            } => tracing::info!(%judge, total, max_total, ?confidence, "judge completed"),
            EvalEvent::AggregateCompleted {
                final_score,
                category,
                excluded,
            } => tracing::info!(final_score, %category, excluded, "aggregation completed"),
            other => tracing::debug!(event = ?other, "panel event"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<EvalEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EvalEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: EvalEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("event writer failed: {0}")]
    Join(String),
}

/// Writes events as JSON lines from a background thread.
#[derive(Clone)]
pub struct JsonlEventSink {
    sender: mpsc::Sender<EvalEvent>,
}

pub struct EventLogWorker {
    handle: Option<std::thread::JoinHandle<Result<(), EventLogError>>>,
}

impl EventLogWorker {
    /// Wait for the writer to drain. All sink clones must be dropped first.
    pub fn join(mut self) -> Result<(), EventLogError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(EventLogError::Join("event writer panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlEventSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, EventLogWorker), EventLogError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<EvalEvent>();
        let handle = std::thread::spawn(move || write_event_loop(file, receiver));
        Ok((
            Self { sender },
            EventLogWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl EventSink for JsonlEventSink {
    fn record(&self, event: EvalEvent) {
        if self.sender.send(event).is_err() {
            tracing::warn!("event log writer closed; dropping event");
        }
    }
}

fn write_event_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<EvalEvent>,
) -> Result<(), EventLogError> {
    let mut writer = BufWriter::new(file);
    for event in receiver {
        let line =
            serde_json::to_string(&event).map_err(|e| EventLogError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Fans one event out to several sinks.
pub struct TeeEventSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl TeeEventSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for TeeEventSink {
    fn record(&self, event: EvalEvent) {
        for sink in &self.sinks {
            sink.record(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryEventSink::new();
        sink.record(EvalEvent::JudgeStarted {
            judge: JudgeKind::Technical,
        });
        sink.record(EvalEvent::JudgeDefaulted {
            judge: JudgeKind::Technical,
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], EvalEvent::JudgeDefaulted { .. }));
    }

    #[test]
    fn tee_forwards_to_every_sink() {
        let a = Arc::new(MemoryEventSink::new());
        let b = Arc::new(MemoryEventSink::new());
        let sinks: Vec<Arc<dyn EventSink>> = vec![a.clone(), b.clone()];
        let tee = TeeEventSink::new(sinks);
        tee.record(EvalEvent::JudgeExcluded {
            judge: JudgeKind::Execution,
        });
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let value = serde_json::to_value(EvalEvent::ScoreClamped {
            judge: JudgeKind::Product,
            criterion: "market_potential".into(),
            original: 40,
            clamped: 15,
        })
        .unwrap();
        assert_eq!(value["event"], "score_clamped");
        assert_eq!(value["judge"], "product");
        assert_eq!(value["clamped"], 15);
    }
}
