use anyhow::{Context, Result, bail};
use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;
use crate::detect::Format;
use crate::import::{ImportOrchestrator, merge_batch};
use crate::llm::AiParser;
use crate::model::ParseResult;

static LOOKING_GLASS: Emoji<'_, '_> = Emoji("🔍 ", "");
static PAPER: Emoji<'_, '_> = Emoji("📄 ", "");
static BRAIN: Emoji<'_, '_> = Emoji("🧠 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[!!] ");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub async fn run(paths: Vec<PathBuf>, hybrid: bool, no_ai: bool, json: bool, out: Option<PathBuf>) -> Result<()> {
    let started = Instant::now();
    // JSON on stdout must stay clean.
    let chatty = !(json && out.is_none());

    let config = Config::load().context("Failed to load configuration. Run 'trailport init' to create one.")?;

    let ai = if no_ai {
        None
    } else {
        match AiParser::from_config(&config) {
            Ok(parser) => Some(parser),
            Err(e) => {
                debug!("AI parsing unavailable: {}", e);
                None
            }
        }
    };

    if chatty {
        println!();
        println!("{}", style(" Trailport - Course Import ").bold().reverse());
        println!();
        match &ai {
            Some(parser) => println!("{}AI parser: {}", BRAIN, style(parser.model()).cyan()),
            None => println!("{}AI parser: {}", BRAIN, style("off").dim()),
        }
        println!(
            "{}Mode: {}",
            BRAIN,
            style(if hybrid { "hybrid" } else { "smart" }).cyan()
        );
        print!("{}Scanning for documents... ", LOOKING_GLASS);
    }

    let documents = collect_documents(&paths)?;
    if chatty {
        println!("{}", style(format!("found {}", documents.len())).green().bold());
        println!();
    }
    if documents.is_empty() {
        bail!("No supported documents found");
    }

    let pb = ProgressBar::hidden();
    let progress = |done: usize, total: usize| {
        if pb.is_hidden() && chatty {
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} chunks {msg}")
    {
        pb.set_style(bar_style.progress_chars("━━╸━"));
    }

    let mut results = Vec::with_capacity(documents.len());
    for doc_path in &documents {
        let name = display_name(doc_path, &paths);
        let bytes = fs::read(doc_path).with_context(|| format!("Failed to read {}", doc_path.display()))?;
        let filename = doc_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());

        if chatty {
            println!("{}{}", PAPER, style(&name).dim());
        }
        pb.set_message(name.clone());

        let mut orchestrator = ImportOrchestrator::new(config.thresholds).with_progress(&progress);
        if let Some(parser) = &ai {
            orchestrator = orchestrator.with_ai(parser);
        }
        let result = if hybrid {
            orchestrator.hybrid_import(&bytes, &filename).await
        } else {
            orchestrator.smart_import(&bytes, &filename).await
        };
        pb.finish_and_clear();
        pb.reset();

        if chatty {
            print_file_status(&result);
        }
        results.push((name, result));
    }

    let merged = merge_batch(results);

    let rendered = serde_json::to_string_pretty(&merged).context("Failed to serialize the import result")?;
    if let Some(out) = &out {
        fs::write(out, &rendered).with_context(|| format!("Failed to write {}", out.display()))?;
    } else if json {
        println!("{}", rendered);
    }

    if chatty {
        print_summary(&merged);
        if let Some(out) = &out {
            println!("{}Wrote {}", CHECK, style(out.display()).cyan());
        }
        println!(
            "{}Done in {:.1}s",
            SPARKLE,
            started.elapsed().as_secs_f64()
        );
        println!();
    }

    if !merged.success {
        bail!("Import failed: {}", merged.errors.join("; "));
    }
    Ok(())
}

fn print_file_status(result: &ParseResult) {
    if result.success {
        let confidence = result
            .confidence_details
            .as_ref()
            .map(|d| format!(", confidence {}%", d.total_score))
            .unwrap_or_default();
        println!(
            "   {}{} trails, {} modules, {} questions via {}{}",
            CHECK,
            style(result.trails.len()).green().bold(),
            style(result.module_count()).green().bold(),
            style(result.question_count()).green().bold(),
            style(result.parse_method).cyan(),
            confidence
        );
    } else {
        for error in &result.errors {
            println!("   {}{}", CROSS, style(error).red());
        }
    }
}

fn print_summary(result: &ParseResult) {
    println!();
    for trail in &result.trails {
        println!(
            "{}{} {} {}",
            SPARKLE,
            trail.icon,
            style(&trail.title).bold(),
            style(format!("({})", trail.slug)).dim()
        );
        for module in &trail.modules {
            let questions = if module.questions.is_empty() {
                String::new()
            } else {
                format!(", {} questions", module.questions.len())
            };
            println!(
                "  {} {} {}",
                style("•").cyan(),
                module.title,
                style(format!("[{}, {} pts{}]", module.module_type, module.points, questions)).dim()
            );
        }
    }
    if !result.warnings.is_empty() {
        println!();
        for warning in &result.warnings {
            println!("{}{}", WARN, style(warning).yellow());
        }
    }
    println!();
}

fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    for path in paths {
        if path.is_file() {
            // Explicitly named files are always attempted.
            documents.push(path.clone());
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_supported_file(p))
                .collect();
            found.sort();
            documents.extend(found);
        } else {
            bail!("Path not found: {}", path.display());
        }
    }

    Ok(documents)
}

fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(Format::from_extension)
        .is_some()
}

/// Path relative to the directory argument it was found under.
fn display_name(path: &Path, roots: &[PathBuf]) -> String {
    roots
        .iter()
        .filter(|root| root.is_dir())
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collect_documents_filters_directories() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        fs::write(dir.path().join("b.exe"), "MZ").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.txt"), "text").unwrap();

        let docs = collect_documents(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = docs.iter().map(|p| display_name(p, &[dir.path().to_path_buf()])).collect();
        assert_eq!(names, vec!["a.md".to_string(), format!("nested{}c.txt", std::path::MAIN_SEPARATOR)]);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        assert!(collect_documents(&[PathBuf::from("/definitely/not/here")]).is_err());
    }

    #[test]
    fn test_named_file_is_kept_whatever_its_extension() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes");
        fs::write(&file, "plain notes").unwrap();
        assert_eq!(collect_documents(std::slice::from_ref(&file)).unwrap(), vec![file]);
    }
}
