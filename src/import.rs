//! Import orchestration: pick the rule-based parser, the AI parser or both,
//! and merge what they produce.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::analyzer::{StructureAnalysis, analyze_default};
use crate::config::Thresholds;
use crate::detect::{Format, detect_format};
use crate::error::ImportError;
use crate::llm::{AiParser, ChunkProgress};
use crate::model::{ParseMethod, ParseResult, ParsedTrail};
use crate::observer::{ParseEvent, ParseObserver, TracingObserver};
use crate::parser::common::unique_slug;
use crate::parser::{self, ParseOptions};

/// Decides between rule-based and AI parsing for each document.
///
/// AI is only used when a parser was attached with [`with_ai`](Self::with_ai).
pub struct ImportOrchestrator<'a> {
    thresholds: Thresholds,
    ai: Option<&'a AiParser>,
    observer: Arc<dyn ParseObserver>,
    progress: Option<ChunkProgress<'a>>,
}

/// A document after detection and analysis.
struct Prepared<'b> {
    filename: String,
    bytes: &'b [u8],
    format: Format,
    text: Result<String, ImportError>,
    analysis: Option<StructureAnalysis>,
}

impl Prepared<'_> {
    fn confidence(&self) -> u32 {
        self.analysis.as_ref().map_or(0, |a| a.confidence)
    }
}

impl<'a> ImportOrchestrator<'a> {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ai: None,
            observer: Arc::new(TracingObserver),
            progress: None,
        }
    }

    pub fn with_ai(mut self, ai: &'a AiParser) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ParseObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_progress(mut self, progress: ChunkProgress<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: ParseEvent) {
        self.observer.on_event(&event);
    }

    fn strategy(&self, strategy: &str) {
        self.emit(ParseEvent::StrategyChosen {
            strategy: strategy.to_string(),
        });
    }

    fn prepare<'b>(&self, bytes: &'b [u8], filename: &str) -> Prepared<'b> {
        let format = detect_format(filename, bytes);
        self.emit(ParseEvent::FormatDetected {
            filename: filename.to_string(),
            format,
        });
        let text = parser::extract_text(format, bytes);
        let analysis = text.as_ref().ok().map(|t| analyze_default(t));
        if let Some(analysis) = &analysis {
            self.emit(ParseEvent::ConfidenceScored {
                confidence: analysis.confidence,
            });
        }
        Prepared {
            filename: filename.to_string(),
            bytes,
            format,
            text,
            analysis,
        }
    }

    fn run_code(&self, doc: &Prepared<'_>) -> ParseResult {
        let options = ParseOptions {
            structured_threshold: self.thresholds.structured_parse,
        };
        parser::parse_document(doc.format, doc.bytes, &options)
    }

    async fn run_ai(&self, ai: &AiParser, doc: &Prepared<'_>) -> ParseResult {
        match &doc.text {
            Ok(text) => ai.parse_auto(text, self.progress).await,
            Err(err) => ParseResult::failure(ParseMethod::Ai, format!("Could not read document text: {}", err)),
        }
    }

    fn finish(&self, mut result: ParseResult, doc: &Prepared<'_>) -> ParseResult {
        for (old, new) in unique_trail_slugs(&mut result.trails, &mut HashSet::new()) {
            result
                .warnings
                .push(format!("Trail slug '{}' is used more than once, renamed to '{}'", old, new));
        }
        if result.confidence_details.is_none() {
            result.confidence_details = doc.analysis.as_ref().map(|a| a.confidence_details.clone());
        }
        info!(
            "Imported {} as {}: {} trails, {} modules, {} questions ({})",
            doc.filename,
            doc.format,
            result.trails.len(),
            result.module_count(),
            result.question_count(),
            result.parse_method
        );
        result
    }

    /// AI first for low-confidence documents, the rule-based parser
    /// otherwise, and AI again as a last resort when the rules fail.
    pub async fn smart_import(&self, bytes: &[u8], filename: &str) -> ParseResult {
        let doc = self.prepare(bytes, filename);
        let confidence = doc.confidence();
        let mut notes = Vec::new();
        let mut ai_tried = false;

        if let Some(ai) = self.ai
            && confidence < self.thresholds.ai_trigger
        {
            self.strategy("ai-first");
            let result = self.run_ai(ai, &doc).await;
            if result.success {
                return self.finish(result, &doc);
            }
            ai_tried = true;
            notes.push(format!(
                "AI parsing failed ({}); used rule-based parsing instead",
                result.errors.join("; ")
            ));
        }

        self.strategy("code");
        let mut code = self.run_code(&doc);
        if code.success {
            code.warnings.splice(0..0, notes);
            return self.finish(code, &doc);
        }

        if let Some(ai) = self.ai
            && !ai_tried
        {
            self.strategy("ai-fallback");
            let mut result = self.run_ai(ai, &doc).await;
            if result.success {
                result.warnings.insert(
                    0,
                    format!("Rule-based parsing failed ({}); parsed by AI instead", code.errors.join("; ")),
                );
                return self.finish(result, &doc);
            }
            code.errors.extend(result.errors.into_iter().map(|e| format!("AI: {}", e)));
        }

        code.warnings.splice(0..0, notes);
        self.finish(code, &doc)
    }

    /// Rule-based parser first; accepted as is when it succeeds with
    /// confidence above `hybrid_accept`. Otherwise the AI result is compared
    /// with it and the richer one wins, or both are merged on a tie.
    pub async fn hybrid_import(&self, bytes: &[u8], filename: &str) -> ParseResult {
        let doc = self.prepare(bytes, filename);
        let code = self.run_code(&doc);

        if code.success && doc.confidence() > self.thresholds.hybrid_accept {
            self.strategy("code-accepted");
            return self.finish(code, &doc);
        }
        let Some(ai) = self.ai else {
            self.strategy("code");
            return self.finish(code, &doc);
        };

        self.strategy("hybrid");
        let ai_result = self.run_ai(ai, &doc).await;
        let result = choose(code, ai_result);
        self.finish(result, &doc)
    }
}

/// Pick the richer result: more trails, then more modules; merge on a tie.
fn choose(mut code: ParseResult, mut ai: ParseResult) -> ParseResult {
    match (code.success, ai.success) {
        (true, false) => {
            code.warnings
                .push(format!("AI parsing failed: {}", ai.errors.join("; ")));
            code
        }
        (false, true) => {
            ai.warnings.insert(
                0,
                format!("Rule-based parsing failed: {}", code.errors.join("; ")),
            );
            ai
        }
        (false, false) => {
            code.errors.extend(ai.errors.into_iter().map(|e| format!("AI: {}", e)));
            code
        }
        (true, true) => {
            let code_size = (code.trails.len(), code.module_count());
            let ai_size = (ai.trails.len(), ai.module_count());
            debug!("Hybrid comparison: code {:?} vs AI {:?}", code_size, ai_size);
            match code_size.cmp(&ai_size) {
                std::cmp::Ordering::Greater => code,
                std::cmp::Ordering::Less => ai,
                std::cmp::Ordering::Equal => merge(code, ai),
            }
        }
    }
}

/// Rule-based trails plus AI trails whose slug is not already present.
fn merge(code: ParseResult, ai: ParseResult) -> ParseResult {
    let mut trails = code.trails;
    let taken: HashSet<String> = trails.iter().map(|t| t.slug.clone()).collect();
    trails.extend(ai.trails.into_iter().filter(|t| !taken.contains(&t.slug)));

    let mut warnings = code.warnings;
    warnings.extend(ai.warnings);
    ParseResult {
        success: true,
        trails,
        warnings,
        errors: Vec::new(),
        parse_method: ParseMethod::Hybrid,
        confidence_details: code.confidence_details,
    }
}

/// Give every trail a slug not yet in `taken`; returns the renames.
fn unique_trail_slugs(trails: &mut [ParsedTrail], taken: &mut HashSet<String>) -> Vec<(String, String)> {
    let mut renamed = Vec::new();
    for trail in trails {
        let slug = unique_slug(&trail.slug, taken);
        if slug != trail.slug {
            renamed.push((std::mem::replace(&mut trail.slug, slug.clone()), slug));
        }
    }
    renamed
}

/// Combine per-file results into one. Trail slugs are made unique across
/// the batch; warnings and errors are prefixed with their file name.
pub fn merge_batch(mut results: Vec<(String, ParseResult)>) -> ParseResult {
    if results.len() == 1
        && let Some((_, mut result)) = results.pop()
    {
        for (old, new) in unique_trail_slugs(&mut result.trails, &mut HashSet::new()) {
            result
                .warnings
                .push(format!("Trail slug '{}' is used more than once, renamed to '{}'", old, new));
        }
        return result;
    }

    let mut taken = HashSet::new();
    let mut merged = ParseResult::default();
    let mut methods = HashSet::new();
    for (filename, result) in results {
        if result.success {
            methods.insert(result.parse_method);
        }
        let mut trails = result.trails;
        for (old, new) in unique_trail_slugs(&mut trails, &mut taken) {
            merged.warnings.push(format!(
                "{}: trail slug '{}' already used in this batch, renamed to '{}'",
                filename, old, new
            ));
        }
        merged.trails.extend(trails);
        merged
            .warnings
            .extend(result.warnings.into_iter().map(|w| format!("{}: {}", filename, w)));
        merged
            .errors
            .extend(result.errors.into_iter().map(|e| format!("{}: {}", filename, e)));
    }

    merged.success = !merged.trails.is_empty();
    merged.parse_method = match methods.len() {
        0 => ParseMethod::Code,
        1 => methods.into_iter().next().unwrap_or_default(),
        _ => ParseMethod::Hybrid,
    };
    merged
}
