use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ai: AiParserConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// Remote model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiParserConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub api_endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for AiParserConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_endpoint: default_endpoint(),
            api_key: String::new(),
            model: default_model(),
        }
    }
}

impl AiParserConfig {
    /// Enabled and holding an API key.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Limits {
    pub check_timeout_secs: u64,
    pub parse_timeout_secs: u64,
    pub max_input_chars: usize,
    pub max_output_tokens: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            check_timeout_secs: 15,
            parse_timeout_secs: 900,
            max_input_chars: 100_000,
            max_output_tokens: 64_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Inputs longer than this go through the chunked AI path.
    pub threshold_chars: usize,
    pub min_chunk_chars: usize,
    pub max_chunk_chars: usize,
    /// Chunk requests in flight at once.
    pub concurrency: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            threshold_chars: 40_000,
            min_chunk_chars: 4_000,
            max_chunk_chars: 20_000,
            concurrency: 3,
        }
    }
}

/// Confidence cut-offs used by the orchestrator and the Txt parser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Below this, `smart_import` asks the model first.
    pub ai_trigger: u32,
    /// Above this, `hybrid_import` accepts the deterministic result as is.
    pub hybrid_accept: u32,
    /// Above this, the Txt parser runs its strict marker grammar.
    pub structured_parse: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ai_trigger: 60,
            hybrid_accept: 70,
            structured_parse: 50,
        }
    }
}

impl Config {
    /// Get the configuration directory path
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("trailport");
        Ok(config_dir)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config file when present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Expand environment variables in configuration values
    fn expand_env_vars(&mut self) {
        self.ai.api_key = expand_env_var(&self.ai.api_key);
        self.ai.api_endpoint = expand_env_var(&self.ai.api_endpoint);
        self.ai.model = expand_env_var(&self.ai.model);
    }

    /// Override settings from `AI_*` variables. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(enabled) = var("AI_PARSER_ENABLED") {
            self.ai.enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(endpoint) = var("AI_API_ENDPOINT") {
            self.ai.api_endpoint = endpoint;
        }
        if let Some(key) = var("AI_API_KEY") {
            self.ai.api_key = key;
        }
        if let Some(model) = var("AI_MODEL") {
            self.ai.model = model;
        }
        if let Some(secs) = var("AI_CHECK_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.limits.check_timeout_secs = secs;
        }
        if let Some(secs) = var("AI_PARSE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.limits.parse_timeout_secs = secs;
        }
        if let Some(chars) = var("AI_MAX_INPUT_CHARS").and_then(|v| v.parse().ok()) {
            self.limits.max_input_chars = chars;
        }
        if let Some(tokens) = var("AI_MAX_OUTPUT_TOKENS").and_then(|v| v.parse().ok()) {
            self.limits.max_output_tokens = tokens;
        }
    }

    /// Commented default file written by `trailport init`.
    pub fn default_toml() -> String {
        format!(
            r#"# trailport configuration

[ai]
# Ask a remote model to structure documents the rules cannot.
enabled = false
api_endpoint = "{endpoint}"
# Literal key, or ${{VAR}} / $VAR to read it from the environment.
api_key = "${{AI_API_KEY}}"
model = "{model}"

[limits]
check_timeout_secs = 15
parse_timeout_secs = 900
max_input_chars = 100000
max_output_tokens = 64000

[chunking]
threshold_chars = 40000
min_chunk_chars = 4000
max_chunk_chars = 20000
concurrency = 3

[thresholds]
ai_trigger = 60
hybrid_accept = 70
structured_parse = 50
"#,
            endpoint = DEFAULT_API_ENDPOINT,
            model = DEFAULT_MODEL
        )
    }
}

/// Expand environment variable references like ${VAR_NAME}
fn expand_env_var(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else if let Some(var_name) = value.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_default()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_expand_env_var_braces() {
        // SAFETY: test is single-threaded
        unsafe { std::env::set_var("TRAILPORT_TEST_VAR_A", "value_a") };
        assert_eq!(expand_env_var("${TRAILPORT_TEST_VAR_A}"), "value_a");
        unsafe { std::env::remove_var("TRAILPORT_TEST_VAR_A") };
    }

    #[test]
    fn test_expand_env_var_dollar() {
        unsafe { std::env::set_var("TRAILPORT_TEST_VAR_B", "value_b") };
        assert_eq!(expand_env_var("$TRAILPORT_TEST_VAR_B"), "value_b");
        unsafe { std::env::remove_var("TRAILPORT_TEST_VAR_B") };
    }

    #[test]
    fn test_expand_env_var_literal() {
        assert_eq!(expand_env_var("literal_value"), "literal_value");
        assert_eq!(expand_env_var("${DEFINITELY_NOT_SET_XYZ_123}"), "");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.ai.enabled);
        assert_eq!(config.ai.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert_eq!(config.limits.check_timeout_secs, 15);
        assert_eq!(config.limits.parse_timeout_secs, 900);
        assert_eq!(config.limits.max_input_chars, 100_000);
        assert_eq!(config.limits.max_output_tokens, 64_000);
        assert_eq!(config.chunking.concurrency, 3);
        assert_eq!(config.thresholds.ai_trigger, 60);
        assert_eq!(config.thresholds.hybrid_accept, 70);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [ai]
            enabled = true
            api_key = "sk-test"

            [thresholds]
            ai_trigger = 40
            "#,
        )
        .unwrap();
        assert!(config.ai.is_usable());
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert_eq!(config.thresholds.ai_trigger, 40);
        assert_eq!(config.thresholds.hybrid_accept, 70);
        assert_eq!(config.limits.parse_timeout_secs, 900);
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let config = Config::from_toml(&Config::default_toml()).unwrap();
        let mut expected = Config::default();
        expected.ai.api_key = expand_env_var("${AI_API_KEY}");
        assert_eq!(config, expected);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AI_PARSER_ENABLED", "true"),
            ("AI_API_KEY", "sk-env"),
            ("AI_MODEL", "other-model"),
            ("AI_PARSE_TIMEOUT_SECS", "60"),
            ("AI_MAX_INPUT_CHARS", "not a number"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert!(config.ai.enabled);
        assert_eq!(config.ai.api_key, "sk-env");
        assert_eq!(config.ai.model, "other-model");
        assert_eq!(config.limits.parse_timeout_secs, 60);
        assert_eq!(config.limits.max_input_chars, 100_000);
    }

    #[test]
    fn test_enabled_without_key_is_not_usable() {
        let mut config = Config::default();
        config.ai.enabled = true;
        assert!(!config.ai.is_usable());
    }
}
