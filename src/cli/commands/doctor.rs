use anyhow::Result;
use console::{Emoji, style};

use crate::config::{Config, DEFAULT_API_ENDPOINT};
use crate::detect::Format;
use crate::llm::check_availability;

static DOCTOR: Emoji<'_, '_> = Emoji("🩺 ", "");
static PASS: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static FAIL: Emoji<'_, '_> = Emoji("❌ ", "[!!] ");
static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[i] ");
static ARROW: Emoji<'_, '_> = Emoji("   → ", "  -> ");

pub async fn run() -> Result<()> {
    println!();
    println!("{}", style(" Trailport Doctor ").bold().reverse());
    println!();
    println!("{}Running diagnostics...", DOCTOR);
    println!();

    let mut tally = Tally::default();

    // ── 1. Binary version ────────────────────────────────────────────
    print_section("Binary");
    tally.pass(&format!("trailport {}", env!("CARGO_PKG_VERSION")));
    let formats: Vec<&str> = Format::ALL.iter().map(|f| f.as_str()).collect();
    info(&format!("Formats: {}", formats.join(", ")));

    // ── 2. Config file ───────────────────────────────────────────────
    print_section("Configuration");

    let config_path = Config::config_path().ok();

    if let Some(ref path) = config_path {
        if path.exists() {
            tally.pass(&format!("Config found at {}", style(path.display()).dim()));
        } else {
            info("No config file, using defaults and environment");
            hint("Run: trailport init");
        }
    } else {
        tally.warn("Cannot determine config directory");
    }

    let config = match Config::load() {
        Ok(c) => {
            tally.pass("Config is valid");
            Some(c)
        }
        Err(e) => {
            tally.fail(&format!("Config parse error: {:#}", e));
            hint("Run: trailport init --force");
            None
        }
    };

    if let Some(ref config) = config {
        let t = &config.thresholds;
        info(&format!(
            "Thresholds: AI below {}%, hybrid accepts above {}%, structured parse from {}%",
            t.ai_trigger, t.hybrid_accept, t.structured_parse
        ));
    }

    // ── 3. AI parser settings ────────────────────────────────────────
    print_section("AI parser");

    let mut check_service = false;
    if let Some(ref config) = config {
        let ai = &config.ai;
        if !ai.enabled {
            info("AI parsing is disabled, only rule-based parsing will be used");
            hint("Enable it: export AI_PARSER_ENABLED=true");
        } else {
            tally.pass("AI parsing is enabled");

            if ai.api_key.trim().is_empty() || ai.api_key.starts_with('$') {
                tally.fail("API key is not set");
                hint("Set AI_API_KEY or api_key in the [ai] section");
            } else {
                tally.pass("API key configured");
                check_service = true;
            }

            if ai.api_endpoint == DEFAULT_API_ENDPOINT {
                info(&format!("Endpoint: {}", ai.api_endpoint));
            } else {
                info(&format!("Endpoint (custom): {}", ai.api_endpoint));
            }
            info(&format!("Model: {}", ai.model));
        }
    } else {
        tally.warn("Skipping AI checks (no config)");
    }

    // ── 4. AI service ────────────────────────────────────────────────
    if let Some(ref config) = config
        && check_service
    {
        print_section("AI service");
        let availability = check_availability(config).await;
        if availability.available {
            tally.pass(&format!(
                "AI service answered ({})",
                availability.model.as_deref().unwrap_or(&config.ai.model)
            ));
        } else {
            tally.fail(&format!(
                "AI service unavailable: {}",
                availability.error.as_deref().unwrap_or("unknown error")
            ));
            hint("Check the key, endpoint and network, then re-run");
        }
    }

    // ── 5. System info ───────────────────────────────────────────────
    print_section("System");

    info(&format!(
        "OS: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    ));

    if let Some(ref path) = config_path {
        info(&format!("Config path: {}", path.display()));
    }

    tally.print_summary();

    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Tally {
    passed: u32,
    warned: u32,
    failed: u32,
}

impl Tally {
    fn pass(&mut self, msg: &str) {
        println!("  {}{}", PASS, msg);
        self.passed += 1;
    }

    fn fail(&mut self, msg: &str) {
        println!("  {}{}", FAIL, style(msg).red());
        self.failed += 1;
    }

    fn warn(&mut self, msg: &str) {
        println!("  {}{}", WARN, style(msg).yellow());
        self.warned += 1;
    }

    fn print_summary(&self) {
        println!();
        println!("{}", style("━".repeat(50)).dim());
        println!();

        let mut parts = vec![format!(
            "{} {} passed",
            style(self.passed).green().bold(),
            plural(self.passed, "check", "checks")
        )];
        if self.warned > 0 {
            parts.push(format!(
                "{} {}",
                style(self.warned).yellow().bold(),
                plural(self.warned, "warning", "warnings")
            ));
        }
        if self.failed > 0 {
            parts.push(format!(
                "{} {}",
                style(self.failed).red().bold(),
                plural(self.failed, "failure", "failures")
            ));
        }
        println!("  {}", parts.join(", "));
        println!();

        if self.failed > 0 {
            println!("  {}", style("Some checks failed. Fix the issues above and re-run:").red());
            println!("    {} trailport doctor", style("$").dim());
        } else if self.warned > 0 {
            println!("  {}", style("Imports will work, but there are some warnings.").yellow());
        } else {
            println!("  {}", style("All checks passed! Ready to import.").green().bold());
        }
        println!();
    }
}

fn plural(n: u32, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 { one } else { many }
}

fn print_section(name: &str) {
    println!("  {}", style(name).bold().underlined());
}

fn info(msg: &str) {
    println!("  {}{}", INFO, style(msg).dim());
}

fn hint(msg: &str) {
    println!("{}{}", ARROW, style(msg).dim());
}
