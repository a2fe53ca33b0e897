use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::PathBuf;

use crate::detect::detect_format;

pub fn run(path: PathBuf) -> Result<()> {
    let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let format = detect_format(&filename, &bytes);
    println!("{}", format);
    if format.is_binary() {
        println!("{}", style("binary container").dim());
    }
    Ok(())
}
