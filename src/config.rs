//! Configuration for the evaluation harness.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.
//! Every knob that the pipeline needs is an explicit struct field here;
//! nothing reads ad-hoc globals at run time.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// LLM endpoint configuration.
///
/// Both the assistant models under evaluation and the judge are served
/// behind one OpenAI-compatible endpoint; `model` is the default model
/// used when a call does not override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Default model name (connectivity checks and data generation)
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Retry attempts for transient API failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_llm_model() -> String {
    "claude-3-5-haiku".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Model identifiers for the configurations under evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Base (untuned) assistant model.
    #[serde(default = "default_base_model")]
    pub base: String,

    /// Fine-tuned assistant model (base + adapter, as served).
    #[serde(default = "default_finetuned_model")]
    pub finetuned: String,
}

fn default_base_model() -> String {
    "mistral-7b-instruct".to_string()
}

fn default_finetuned_model() -> String {
    "mistral-7b-physics-finetune".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base: default_base_model(),
            finetuned: default_finetuned_model(),
        }
    }
}

/// Judge model configuration for rubric grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Primary judge model (stronger reasoning for explanation grading).
    #[serde(default = "default_judge_model")]
    pub model: String,

    /// Cheaper model tried when the primary judge fails.
    #[serde(default = "default_judge_fallback")]
    pub fallback_model: String,

    /// Maximum tokens for judge responses.
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
}

fn default_judge_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_judge_fallback() -> String {
    "claude-3-5-haiku".to_string()
}

fn default_judge_max_tokens() -> u32 {
    300
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            fallback_model: default_judge_fallback(),
            max_tokens: default_judge_max_tokens(),
        }
    }
}

/// Paths and knobs for the evaluation run itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Question set (JSON array of question records).
    #[serde(default = "default_questions_path")]
    pub questions_path: PathBuf,

    /// Instruction dataset (JSONL) used to build the retrieval corpus.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Persisted vector index.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Parallel passage metadata file (one line per passage).
    #[serde(default = "default_meta_path")]
    pub meta_path: PathBuf,

    /// Results table (CSV).
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,

    /// Passages retrieved per question when RAG is enabled.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Relative tolerance for numeric grading.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_questions_path() -> PathBuf {
    PathBuf::from("data/physics_questions_50.json")
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/alpaca_physics_5k.jsonl")
}

fn default_index_path() -> PathBuf {
    PathBuf::from("data/rag_index.bin")
}

fn default_meta_path() -> PathBuf {
    PathBuf::from("data/rag_meta.txt")
}

fn default_results_path() -> PathBuf {
    PathBuf::from("data/results_table.csv")
}

fn default_top_k() -> usize {
    5
}

fn default_tolerance() -> f64 {
    0.05
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            questions_path: default_questions_path(),
            dataset_path: default_dataset_path(),
            index_path: default_index_path(),
            meta_path: default_meta_path(),
            results_path: default_results_path(),
            top_k: default_top_k(),
            tolerance: default_tolerance(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM endpoint settings
    pub llm: LlmConfig,
    /// Assistant model identifiers
    pub models: ModelsConfig,
    /// Judge settings
    pub judge: JudgeConfig,
    /// Evaluation paths and knobs
    pub eval: EvalConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    models: Option<ModelsConfig>,
    judge: Option<JudgeFileSection>,
    eval: Option<EvalConfig>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    max_retries: Option<u32>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JudgeFileSection {
    model: Option<String>,
    fallback_model: Option<String>,
    max_tokens: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/physics-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file first
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        // Override with environment variables
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            config.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            config.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                config.llm.max_tokens = tokens;
            }
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            if let Ok(temp) = temperature.parse() {
                config.llm.temperature = temp;
            }
        }

        if let Ok(base) = env::var("EVAL_BASE_MODEL") {
            config.models.base = base;
        }

        if let Ok(finetuned) = env::var("EVAL_FINETUNED_MODEL") {
            config.models.finetuned = finetuned;
        }

        if let Ok(judge) = env::var("JUDGE_MODEL") {
            config.judge.model = judge;
        }

        if let Ok(fallback) = env::var("JUDGE_FALLBACK_MODEL") {
            config.judge.fallback_model = fallback;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        let file_config: ConfigFile = serde_yaml::from_str(&content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(max_retries) = llm.max_retries {
                config.llm.max_retries = max_retries;
            }
            if let Some(timeout) = llm.timeout_seconds {
                config.llm.timeout_seconds = timeout;
            }
        }

        if let Some(models) = file_config.models {
            config.models = models;
        }

        if let Some(judge) = file_config.judge {
            if let Some(model) = judge.model {
                config.judge.model = model;
            }
            if let Some(fallback) = judge.fallback_model {
                config.judge.fallback_model = fallback;
            }
            if let Some(max_tokens) = judge.max_tokens {
                config.judge.max_tokens = max_tokens;
            }
        }

        if let Some(eval) = file_config.eval {
            config.eval = eval;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "physics-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(EvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(EvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.models.base.is_empty() {
            return Err(EvalError::Config(
                "Base model identifier is required.".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.eval.top_k, 5);
        assert!((config.eval.tolerance - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "mistral-7b");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.model, "mistral-7b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_partial_sections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  api_base: "https://llm.internal"
  api_key: "k"
judge:
  model: "judge-large"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.llm.api_base, "https://llm.internal");
        assert_eq!(config.judge.model, "judge-large");
        // Untouched sections keep defaults
        assert_eq!(config.judge.max_tokens, 300);
        assert_eq!(config.models.base, default_base_model());
    }
}
