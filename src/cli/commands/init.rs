use anyhow::{Context, Result};
use console::{Emoji, style};
use std::fs;

use crate::config::Config;

static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
static KEY: Emoji<'_, '_> = Emoji("🔑 ", "");

pub async fn run(force: bool) -> Result<()> {
    println!();
    println!("{}", style(" Trailport - Initialization ").bold().reverse());
    println!();

    let config_dir = Config::config_dir()?;
    let config_path = Config::config_path()?;

    if config_path.exists() && !force {
        println!(
            "{}Configuration already exists at {}",
            WARN,
            style(config_path.display()).cyan()
        );
        println!("  Use {} to overwrite", style("--force").yellow());
        return Ok(());
    }

    fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    fs::write(&config_path, Config::default_toml()).context("Failed to write config file")?;

    println!(
        "{}Created configuration at {}",
        CHECK,
        style(config_path.display()).cyan()
    );

    println!();
    println!("{}", style("━".repeat(50)).dim());
    println!();
    println!("{}Next steps:", ROCKET);
    println!();
    println!("  {}Enable the AI parser (optional):", KEY);
    println!("    {} export AI_PARSER_ENABLED=true", style("$").dim());
    println!("    {} export AI_API_KEY=...", style("$").dim());
    println!();
    println!("  {}Import your first course:", ROCKET);
    println!("    {} trailport sample txt > course.txt", style("$").dim());
    println!("    {} trailport import course.txt", style("$").dim());
    println!();

    Ok(())
}
