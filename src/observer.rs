//! Diagnostic events emitted by the AI parser and the orchestrator.
//!
//! Pipeline code reports through a [`ParseObserver`] handed to it by the
//! caller instead of logging directly, so tests can capture the events.

use tracing::{debug, info, warn};

use crate::detect::Format;
use crate::llm::parsing::RecoveryTier;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseEvent {
    FormatDetected {
        filename: String,
        format: Format,
    },
    ConfidenceScored {
        confidence: u32,
    },
    InputTruncated {
        original_chars: usize,
        kept_chars: usize,
    },
    AiRequestStarted {
        chunk: Option<usize>,
        chars: usize,
    },
    AiRequestFinished {
        chunk: Option<usize>,
        response_chars: usize,
        stop_reason: Option<String>,
    },
    AiRequestFailed {
        chunk: Option<usize>,
        error: String,
    },
    RecoveryTierUsed {
        tier: RecoveryTier,
    },
    ChunkingPlanned {
        chunks: usize,
        batch_width: usize,
    },
    StrategyChosen {
        strategy: String,
    },
}

pub trait ParseObserver: Send + Sync {
    fn on_event(&self, event: &ParseEvent);
}

/// Default observer: forwards events to `tracing`.
pub struct TracingObserver;

impl ParseObserver for TracingObserver {
    fn on_event(&self, event: &ParseEvent) {
        match event {
            ParseEvent::FormatDetected { filename, format } => {
                info!("Detected format {} for {}", format, filename)
            }
            ParseEvent::ConfidenceScored { confidence } => {
                info!("Structure confidence: {}%", confidence)
            }
            ParseEvent::InputTruncated {
                original_chars,
                kept_chars,
            } => warn!(
                "Input truncated from {} to {} characters",
                original_chars, kept_chars
            ),
            ParseEvent::AiRequestStarted { chunk, chars } => {
                debug!("AI request started (chunk {:?}, {} chars)", chunk, chars)
            }
            ParseEvent::AiRequestFinished {
                chunk,
                response_chars,
                stop_reason,
            } => debug!(
                "AI request finished (chunk {:?}, {} chars, stop reason {:?})",
                chunk, response_chars, stop_reason
            ),
            ParseEvent::AiRequestFailed { chunk, error } => {
                warn!("AI request failed (chunk {:?}): {}", chunk, error)
            }
            ParseEvent::RecoveryTierUsed { tier } => {
                info!("AI output recovered via {}", tier)
            }
            ParseEvent::ChunkingPlanned { chunks, batch_width } => info!(
                "Processing {} chunks in batches of {}",
                chunks, batch_width
            ),
            ParseEvent::StrategyChosen { strategy } => info!("Import strategy: {}", strategy),
        }
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<ParseEvent>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn events(&self) -> Vec<ParseEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ParseObserver for RecordingObserver {
    fn on_event(&self, event: &ParseEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::default();
        observer.on_event(&ParseEvent::ConfidenceScored { confidence: 10 });
        observer.on_event(&ParseEvent::StrategyChosen {
            strategy: "code".into(),
        });
        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ParseEvent::ConfidenceScored { confidence: 10 });
    }
}
