//! AI-assisted parsing: a remote model turns free text into the course
//! model. The transport sits behind [`CompletionBackend`] so the parser and
//! its recovery logic can be driven by a scripted backend in tests.

mod ai_parser;
mod anthropic;
pub mod parsing;
mod prompts;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::RemoteError;

pub use ai_parser::{AiParser, Availability, ChunkProgress, check_availability};

/// One request to the remote model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// The assistant text and why generation stopped (`max_tokens` means cut off).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub stop_reason: Option<String>,
}

impl Completion {
    pub fn was_truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}

/// Trait for completion transports
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, RemoteError>;

    /// Model identifier, for reporting.
    fn model(&self) -> &str;
}

/// Test backend answering from a closure over the request.
#[cfg(test)]
pub(crate) struct ScriptedBackend<F>
where
    F: Fn(&CompletionRequest) -> Result<Completion, RemoteError> + Send + Sync,
{
    respond: F,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl<F> ScriptedBackend<F>
where
    F: Fn(&CompletionRequest) -> Result<Completion, RemoteError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl<F> CompletionBackend for ScriptedBackend<F>
where
    F: Fn(&CompletionRequest) -> Result<Completion, RemoteError> + Send + Sync,
{
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, RemoteError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        (self.respond)(request)
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Shorthand for a finished completion.
#[cfg(test)]
pub(crate) fn reply(text: &str) -> Result<Completion, RemoteError> {
    Ok(Completion {
        text: text.to_string(),
        stop_reason: Some("end_turn".into()),
    })
}
