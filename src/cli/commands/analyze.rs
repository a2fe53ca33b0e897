use anyhow::{Context, Result};
use console::{Emoji, style};
use std::fs;
use std::path::PathBuf;

use crate::analyzer::analyze_default;
use crate::detect::detect_format;
use crate::parser::extract_text;

static MET: Emoji<'_, '_> = Emoji("✅ ", "[x] ");
static UNMET: Emoji<'_, '_> = Emoji("▫️  ", "[ ] ");

pub fn run(path: PathBuf, json: bool) -> Result<()> {
    let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let format = detect_format(&filename, &bytes);
    let text = extract_text(format, &bytes).with_context(|| format!("Failed to read text from {}", path.display()))?;
    let analysis = analyze_default(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!();
    println!("{}", style(" Trailport - Structure Analysis ").bold().reverse());
    println!();
    println!("  {} {}", style("Format:").bold(), style(format).cyan());
    println!(
        "  {} {} trails, {} modules, {} questions",
        style("Detected:").bold(),
        analysis.detected_trails,
        analysis.detected_modules,
        analysis.detected_questions
    );
    println!();

    for criterion in &analysis.confidence_details.criteria {
        let mark = if criterion.met { MET } else { UNMET };
        println!(
            "  {}{:<24} {:>3}/{:<3} {}",
            mark,
            criterion.name,
            criterion.score,
            criterion.max_score,
            style(&criterion.description).dim()
        );
    }

    println!();
    println!("{}", style("━".repeat(50)).dim());
    let score = style(format!("{}%", analysis.confidence)).bold();
    let score = match analysis.confidence {
        70.. => score.green(),
        50..70 => score.yellow(),
        _ => score.red(),
    };
    println!("  Confidence: {}", score);
    println!();

    Ok(())
}
