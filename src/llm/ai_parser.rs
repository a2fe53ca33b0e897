use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::parsing::{RecoveryTier, recover_json};
use super::prompts::{
    CHUNK_SYSTEM_PROMPT, FULL_PARSE_SYSTEM_PROMPT, METADATA_SYSTEM_PROMPT, PING_PROMPT, chunk_user_prompt,
    document_user_prompt, metadata_user_prompt,
};
use super::anthropic::AnthropicBackend;
use super::{CompletionBackend, CompletionRequest};
use crate::config::{ChunkingConfig, Config, Limits};
use crate::error::RemoteError;
use crate::model::{ParseMethod, ParseResult, ParsedModule, ParsedTrail};
use crate::observer::{ParseEvent, ParseObserver, TracingObserver};
use crate::parser::aliases::{Field, first_array, first_str};
use crate::parser::chunker::SectionChunker;
use crate::parser::common::{dedupe_module_slugs, first_line_title};
use crate::parser::normalize::{Normalizer, SYNTHETIC_TRAIL_TITLE};

/// Token budget for the course-metadata request.
const METADATA_MAX_TOKENS: u32 = 1_024;
/// Token budget for the availability check.
const PING_MAX_TOKENS: u32 = 16;

/// Progress callback for chunked parsing: `(chunks done, chunks total)`.
pub type ChunkProgress<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// Parses documents by asking a remote model for the course JSON.
pub struct AiParser {
    backend: Arc<dyn CompletionBackend>,
    limits: Limits,
    chunking: ChunkingConfig,
    observer: Arc<dyn ParseObserver>,
}

/// Modules recovered from one chunk, with the chunk's own warnings.
struct ChunkOutput {
    modules: Vec<ParsedModule>,
    warnings: Vec<String>,
}

impl AiParser {
    pub fn new(backend: Arc<dyn CompletionBackend>, limits: Limits, chunking: ChunkingConfig) -> Self {
        Self {
            backend,
            limits,
            chunking,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Build a parser on the HTTP backend. Fails when AI parsing is disabled
    /// or has no API key.
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        if !config.ai.enabled {
            return Err(RemoteError::NotConfigured(
                "AI parsing is disabled. Set AI_PARSER_ENABLED=true or ai.enabled in the config file".into(),
            ));
        }
        let backend = AnthropicBackend::new(&config.ai)?;
        Ok(Self::new(
            Arc::new(backend),
            config.limits.clone(),
            config.chunking.clone(),
        ))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ParseObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    fn emit(&self, event: ParseEvent) {
        self.observer.on_event(&event);
    }

    fn request(&self, system: &str, user: String) -> CompletionRequest {
        CompletionRequest {
            system: system.to_string(),
            user,
            max_tokens: self.limits.max_output_tokens,
            timeout: Duration::from_secs(self.limits.parse_timeout_secs),
        }
    }

    /// Single request, or chunked when the input is over the chunking threshold.
    pub async fn parse_auto(&self, content: &str, progress: Option<ChunkProgress<'_>>) -> ParseResult {
        if content.chars().count() > self.chunking.threshold_chars {
            self.parse_chunked(content, progress).await
        } else {
            self.parse(content).await
        }
    }

    /// Parse the whole document in one request.
    pub async fn parse(&self, content: &str) -> ParseResult {
        if content.trim().is_empty() {
            return ParseResult::failure(ParseMethod::Ai, "Document is empty");
        }
        let mut warnings = Vec::new();
        let text = self.truncate_input(content, &mut warnings);

        self.emit(ParseEvent::AiRequestStarted {
            chunk: None,
            chars: text.chars().count(),
        });
        let request = self.request(FULL_PARSE_SYSTEM_PROMPT, document_user_prompt(text));
        let completion = match self.backend.complete(&request).await {
            Ok(completion) => completion,
            Err(err) => {
                self.emit(ParseEvent::AiRequestFailed {
                    chunk: None,
                    error: err.to_string(),
                });
                let mut result = ParseResult::failure(ParseMethod::Ai, format!("AI parsing failed: {}", err));
                result.warnings = warnings;
                return result;
            }
        };
        self.emit(ParseEvent::AiRequestFinished {
            chunk: None,
            response_chars: completion.text.chars().count(),
            stop_reason: completion.stop_reason.clone(),
        });
        if completion.was_truncated() {
            warnings.push("AI response reached the output token limit and was cut off".into());
        }

        let Some(value) = self.recover(&completion.text, &mut warnings) else {
            let mut result = ParseResult::failure(ParseMethod::Ai, "AI response contained no parseable JSON");
            result.warnings = warnings;
            return result;
        };
        let trails = Normalizer::MODEL.trails(&value, &mut warnings);
        info!(
            "AI parser produced {} trails with {} modules",
            trails.len(),
            trails.iter().map(|t| t.modules.len()).sum::<usize>()
        );
        ParseResult::from_trails(trails, warnings, ParseMethod::Ai)
    }

    /// Cut the input at `max_input_chars`, recording a warning.
    fn truncate_input<'a>(&self, content: &'a str, warnings: &mut Vec<String>) -> &'a str {
        let max = self.limits.max_input_chars;
        let Some((cut, _)) = content.char_indices().nth(max) else {
            return content;
        };
        let original_chars = content.chars().count();
        warnings.push(format!(
            "Document is too long for AI parsing: only the first {} of {} characters were sent",
            max, original_chars
        ));
        self.emit(ParseEvent::InputTruncated {
            original_chars,
            kept_chars: max,
        });
        &content[..cut]
    }

    fn recover(&self, text: &str, warnings: &mut Vec<String>) -> Option<Value> {
        let recovered = recover_json(text)?;
        if recovered.tier != RecoveryTier::Direct {
            self.emit(ParseEvent::RecoveryTierUsed { tier: recovered.tier });
        }
        if let Some(warning) = recovered.tier.warning() {
            warnings.push(warning.to_string());
        }
        Some(recovered.value)
    }

    /// Parse a long document chunk by chunk under one trail.
    ///
    /// Course metadata is requested alongside the first batch of chunks.
    /// Batches run `concurrency` requests at a time, and a batch starts only
    /// after the previous one has settled. A failed chunk becomes a warning.
    /// Modules keep their chunk order whatever order the responses arrive in.
    pub async fn parse_chunked(&self, content: &str, progress: Option<ChunkProgress<'_>>) -> ParseResult {
        if content.trim().is_empty() {
            return ParseResult::failure(ParseMethod::Ai, "Document is empty");
        }
        let chunker = SectionChunker::new(self.chunking.min_chunk_chars, self.chunking.max_chunk_chars);
        let chunks = chunker.split(content);
        if chunks.len() <= 1 {
            return self.parse(content).await;
        }

        let total = chunks.len();
        let width = self.chunking.concurrency.max(1);
        self.emit(ParseEvent::ChunkingPlanned {
            chunks: total,
            batch_width: width,
        });
        let done = AtomicUsize::new(0);

        let mut batches = chunks.chunks(width);
        let first_batch = batches.next().unwrap_or_default();
        let (metadata, mut outputs) = tokio::join!(
            self.request_metadata(content),
            self.run_batch(first_batch, 0, total, &done, progress)
        );
        let mut offset = first_batch.len();
        for batch in batches {
            outputs.extend(self.run_batch(batch, offset, total, &done, progress).await);
            offset += batch.len();
        }

        let mut warnings = Vec::new();
        let mut modules = Vec::new();
        let mut failed = 0;
        for (index, output) in outputs.into_iter().enumerate() {
            match output {
                Ok(output) => {
                    warnings.extend(output.warnings);
                    modules.extend(output.modules);
                }
                Err(error) => {
                    failed += 1;
                    warnings.push(format!("Chunk {} of {} failed: {}", index + 1, total, error));
                }
            }
        }
        debug!("Chunked parse: {} of {} chunks failed", failed, total);

        if modules.is_empty() {
            let mut result = ParseResult::failure(
                ParseMethod::Ai,
                format!("No modules could be extracted from any of the {} chunks", total),
            );
            result.warnings = warnings;
            return result;
        }

        let mut trail = self.trail_from_metadata(metadata, content, &mut warnings);
        trail.modules = modules;
        dedupe_module_slugs(&mut trail);
        ParseResult::from_trails(vec![trail], warnings, ParseMethod::Ai)
    }

    async fn run_batch(
        &self,
        batch: &[String],
        offset: usize,
        total: usize,
        done: &AtomicUsize,
        progress: Option<ChunkProgress<'_>>,
    ) -> Vec<Result<ChunkOutput, String>> {
        join_all(batch.iter().enumerate().map(|(i, chunk)| async move {
            let output = self.parse_chunk(chunk, offset + i, total).await;
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(progress) = progress {
                progress(finished, total);
            }
            output
        }))
        .await
    }

    async fn parse_chunk(&self, text: &str, index: usize, total: usize) -> Result<ChunkOutput, String> {
        self.emit(ParseEvent::AiRequestStarted {
            chunk: Some(index),
            chars: text.chars().count(),
        });
        let request = self.request(CHUNK_SYSTEM_PROMPT, chunk_user_prompt(text, index, total));
        let completion = self.backend.complete(&request).await.map_err(|err| {
            self.emit(ParseEvent::AiRequestFailed {
                chunk: Some(index),
                error: err.to_string(),
            });
            err.to_string()
        })?;
        self.emit(ParseEvent::AiRequestFinished {
            chunk: Some(index),
            response_chars: completion.text.chars().count(),
            stop_reason: completion.stop_reason.clone(),
        });

        let mut warnings = Vec::new();
        if completion.was_truncated() {
            warnings.push("response reached the output token limit and was cut off".to_string());
        }
        let value = self
            .recover(&completion.text, &mut warnings)
            .ok_or_else(|| "response contained no parseable JSON".to_string())?;

        let modules = match value.as_object().and_then(|obj| first_array(obj, Field::Modules)) {
            Some(items) => items
                .iter()
                .enumerate()
                .filter_map(|(idx, item)| Normalizer::MODEL.module(item.as_object()?, idx, &mut warnings))
                .collect(),
            // The model answered with whole trails anyway.
            None => Normalizer::MODEL
                .trails(&value, &mut warnings)
                .into_iter()
                .flat_map(|trail| trail.modules)
                .collect(),
        };
        let warnings = warnings
            .into_iter()
            .map(|w| format!("Chunk {} of {}: {}", index + 1, total, w))
            .collect();
        Ok(ChunkOutput { modules, warnings })
    }

    async fn request_metadata(&self, content: &str) -> Option<Map<String, Value>> {
        let request = CompletionRequest {
            system: METADATA_SYSTEM_PROMPT.to_string(),
            user: metadata_user_prompt(content),
            max_tokens: METADATA_MAX_TOKENS,
            timeout: Duration::from_secs(self.limits.parse_timeout_secs),
        };
        match self.backend.complete(&request).await {
            Ok(completion) => match recover_json(&completion.text)?.value {
                Value::Object(obj) => Some(obj),
                _ => None,
            },
            Err(err) => {
                self.emit(ParseEvent::AiRequestFailed {
                    chunk: None,
                    error: err.to_string(),
                });
                None
            }
        }
    }

    fn trail_from_metadata(
        &self,
        metadata: Option<Map<String, Value>>,
        content: &str,
        warnings: &mut Vec<String>,
    ) -> ParsedTrail {
        let fallback_title = || first_line_title(content).unwrap_or_else(|| SYNTHETIC_TRAIL_TITLE.to_string());
        match metadata {
            Some(obj) if first_str(&obj, Field::Title).is_some() => {
                // The metadata object has no modules by construction.
                let mut scratch = Vec::new();
                Normalizer::MODEL
                    .trail(&obj, 0, &mut scratch)
                    .unwrap_or_else(|| ParsedTrail::new(fallback_title()))
            }
            _ => {
                warnings.push("Course metadata could not be generated; the title was taken from the document".into());
                ParsedTrail::new(fallback_title())
            }
        }
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Check that AI parsing is configured and the service answers a tiny request
/// within the check timeout.
pub async fn check_availability(config: &Config) -> Availability {
    if !config.ai.enabled {
        return Availability {
            available: false,
            error: Some("AI parsing is disabled (AI_PARSER_ENABLED is not set)".into()),
            model: None,
        };
    }
    match AnthropicBackend::new(&config.ai) {
        Ok(backend) => ping(&backend, Duration::from_secs(config.limits.check_timeout_secs)).await,
        Err(err) => Availability {
            available: false,
            error: Some(err.to_string()),
            model: Some(config.ai.model.clone()),
        },
    }
}

pub(crate) async fn ping(backend: &dyn CompletionBackend, timeout: Duration) -> Availability {
    let request = CompletionRequest {
        system: String::new(),
        user: PING_PROMPT.to_string(),
        max_tokens: PING_MAX_TOKENS,
        timeout,
    };
    let model = Some(backend.model().to_string());
    match backend.complete(&request).await {
        Ok(_) => Availability {
            available: true,
            error: None,
            model,
        },
        Err(err) => Availability {
            available: false,
            error: Some(err.to_string()),
            model,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, ScriptedBackend, reply};
    use crate::model::ModuleType;
    use crate::observer::RecordingObserver;

    const COURSE: &str = r##"{"trails":[{"title":"Rust Basics","icon":"🦀","color":"#B7410E","modules":[
        {"title":"Ownership","type":"THEORY","content":"Every value has one owner."},
        {"title":"Quiz","type":"PRACTICE","questions":[{"type":"SINGLE_CHOICE","question":"Who owns a value?","options":["One owner","Everyone"],"correctAnswer":0}]}
    ]}]}"##;

    fn parser<F>(backend: Arc<ScriptedBackend<F>>) -> AiParser
    where
        F: Fn(&CompletionRequest) -> Result<Completion, RemoteError> + Send + Sync + 'static,
    {
        AiParser::new(backend, Limits::default(), ChunkingConfig::default())
    }

    #[tokio::test]
    async fn test_parse_well_formed_response() {
        let backend = Arc::new(ScriptedBackend::new(|_| reply(COURSE)));
        let result = parser(backend.clone()).parse("Rust course notes").await;
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.parse_method, ParseMethod::Ai);
        assert_eq!(result.trails[0].title, "Rust Basics");
        assert_eq!(result.trails[0].modules[1].module_type, ModuleType::Practice);
        assert_eq!(result.question_count(), 1);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_truncated_response_is_recovered_with_warnings() {
        let cut = &COURSE[..COURSE.find("{\"title\":\"Quiz\"").unwrap() + 20];
        let response = format!("```json\n{}", cut);
        let backend = Arc::new(ScriptedBackend::new(move |_| {
            Ok(Completion {
                text: response.clone(),
                stop_reason: Some("max_tokens".into()),
            })
        }));
        let observer = Arc::new(RecordingObserver::default());
        let result = parser(backend).with_observer(observer.clone()).parse("notes").await;

        assert!(result.success);
        assert_eq!(result.module_count(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("output token limit")));
        assert!(result.warnings.iter().any(|w| w.contains("repaired")));
        assert!(
            observer
                .events()
                .contains(&ParseEvent::RecoveryTierUsed { tier: RecoveryTier::Repaired })
        );
    }

    #[tokio::test]
    async fn test_no_json_is_a_failure() {
        let backend = Arc::new(ScriptedBackend::new(|_| reply("Sorry, I cannot help with that.")));
        let result = parser(backend).parse("notes").await;
        assert!(!result.success);
        assert_eq!(result.errors, vec!["AI response contained no parseable JSON".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let backend = Arc::new(ScriptedBackend::new(|_| Err(RemoteError::Timeout(900))));
        let result = parser(backend).parse("notes").await;
        assert!(!result.success);
        assert!(result.errors[0].contains("timed out after 900 seconds"));
    }

    #[tokio::test]
    async fn test_long_input_is_truncated_with_warning() {
        let backend = Arc::new(ScriptedBackend::new(|request| {
            assert!(!request.user.contains("tail"));
            reply(COURSE)
        }));
        let limits = Limits {
            max_input_chars: 20,
            ..Limits::default()
        };
        let observer = Arc::new(RecordingObserver::default());
        let parser = AiParser::new(backend, limits, ChunkingConfig::default()).with_observer(observer.clone());
        let content = format!("{}tail", "а".repeat(30));
        let result = parser.parse(&content).await;

        assert!(result.success);
        assert!(result.warnings[0].contains("first 20 of 34 characters"));
        assert!(observer.events().contains(&ParseEvent::InputTruncated {
            original_chars: 34,
            kept_chars: 20
        }));
    }

    fn chunked_document() -> String {
        (1..=5)
            .map(|n| format!("# Lesson {}\n\n{}", n, "Some lesson text that fills the section. ".repeat(3)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn fragment_index(user: &str) -> usize {
        user.trim_start_matches("fragment ")
            .split_whitespace()
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_chunked_keeps_order_and_records_failed_chunks() {
        let content = chunked_document();
        let chunking = ChunkingConfig {
            threshold_chars: 100,
            min_chunk_chars: 50,
            max_chunk_chars: 200,
            concurrency: 2,
        };
        let expected_chunks = SectionChunker::new(50, 200).split(&content).len();
        assert!(expected_chunks >= 3);

        let backend = Arc::new(ScriptedBackend::new(|request| {
            if request.system == METADATA_SYSTEM_PROMPT {
                return reply(r##"{"title":"Chunked Course","icon":"📘","color":"#112233"}"##);
            }
            match fragment_index(&request.user) {
                2 => Err(RemoteError::Http {
                    status: 529,
                    body: "overloaded".into(),
                }),
                n => reply(&format!(r#"{{"modules":[{{"title":"Part {}","content":"text"}}]}}"#, n)),
            }
        }));
        let observer = Arc::new(RecordingObserver::default());
        let parser = AiParser::new(backend.clone(), Limits::default(), chunking).with_observer(observer.clone());

        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |done: usize, total: usize| seen.lock().unwrap().push((done, total));
        let result = parser.parse_auto(&content, Some(&progress)).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.trails.len(), 1);
        assert_eq!(result.trails[0].title, "Chunked Course");
        let titles: Vec<String> = result.trails[0].modules.iter().map(|m| m.title.clone()).collect();
        let expected: Vec<String> = (1..=expected_chunks)
            .filter(|n| *n != 2)
            .map(|n| format!("Part {}", n))
            .collect();
        assert_eq!(titles, expected);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.starts_with(&format!("Chunk 2 of {} failed", expected_chunks)))
        );
        assert_eq!(backend.calls(), expected_chunks + 1);
        assert_eq!(seen.lock().unwrap().last(), Some(&(expected_chunks, expected_chunks)));
        assert!(observer.events().contains(&ParseEvent::ChunkingPlanned {
            chunks: expected_chunks,
            batch_width: 2
        }));
    }

    #[tokio::test]
    async fn test_chunked_without_metadata_uses_first_line() {
        let content = chunked_document();
        let chunking = ChunkingConfig {
            threshold_chars: 100,
            min_chunk_chars: 50,
            max_chunk_chars: 200,
            concurrency: 3,
        };
        let backend = Arc::new(ScriptedBackend::new(|request| {
            if request.system == METADATA_SYSTEM_PROMPT {
                return Err(RemoteError::Timeout(900));
            }
            reply(r#"{"modules":[{"title":"Same"}]}"#)
        }));
        let result = AiParser::new(backend, Limits::default(), chunking)
            .parse_chunked(&content, None)
            .await;

        assert!(result.success);
        assert_eq!(result.trails[0].title, "Lesson 1");
        assert!(result.warnings.iter().any(|w| w.contains("metadata")));
        let slugs: Vec<&str> = result.trails[0].modules.iter().map(|m| m.slug.as_str()).collect();
        assert_eq!(slugs[0], "same");
        assert_eq!(slugs[1], "same-2");
    }

    #[tokio::test]
    async fn test_all_chunks_failing_is_a_failure() {
        let content = chunked_document();
        let chunking = ChunkingConfig {
            threshold_chars: 100,
            min_chunk_chars: 50,
            max_chunk_chars: 200,
            concurrency: 3,
        };
        let backend = Arc::new(ScriptedBackend::new(|_| Err(RemoteError::ConnectionRefused("refused".into()))));
        let result = AiParser::new(backend, Limits::default(), chunking)
            .parse_chunked(&content, None)
            .await;
        assert!(!result.success);
        assert!(result.errors[0].starts_with("No modules could be extracted"));
        assert!(result.warnings.iter().all(|w| w.contains("failed")));
    }

    #[test]
    fn test_ping_reports_availability() {
        let ok = ScriptedBackend::new(|_| reply("OK"));
        let availability = tokio_test::block_on(ping(&ok, Duration::from_secs(1)));
        assert!(availability.available);
        assert_eq!(availability.model.as_deref(), Some("scripted"));

        let down = ScriptedBackend::new(|_| Err(RemoteError::Dns("no such host".into())));
        let availability = tokio_test::block_on(ping(&down, Duration::from_secs(1)));
        assert!(!availability.available);
        assert!(availability.error.unwrap().contains("resolve"));
    }

    #[test]
    fn test_disabled_config_is_unavailable() {
        let availability = tokio_test::block_on(check_availability(&Config::default()));
        assert!(!availability.available);
        assert!(availability.error.unwrap().contains("disabled"));
        assert!(AiParser::from_config(&Config::default()).is_err());
    }
}
