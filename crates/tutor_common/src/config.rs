//! Configuration management for the tutor.
//!
//! Loads settings from `$TUTOR_CONFIG`, the user config dir
//! (`~/.config/tutor/config.toml`) or `/etc/tutor/config.toml`, in that
//! order, or uses defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Result, TutorError};

/// Env var naming an explicit config file
pub const CONFIG_ENV: &str = "TUTOR_CONFIG";

/// System-wide config file path
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tutor/config.toml";

/// LLM transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Env var holding the API key. Unset disables the LLM paths.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call wall-clock timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_classifier_max_tokens")]
    pub classifier_max_tokens: u32,

    #[serde(default = "default_classifier_temperature")]
    pub classifier_temperature: f32,

    #[serde(default = "default_refiner_max_tokens")]
    pub refiner_max_tokens: u32,

    #[serde(default = "default_refiner_temperature")]
    pub refiner_temperature: f32,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "TUTOR_LLM_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    8
}

fn default_classifier_max_tokens() -> u32 {
    200
}

fn default_classifier_temperature() -> f32 {
    0.0
}

fn default_refiner_max_tokens() -> u32 {
    700
}

fn default_refiner_temperature() -> f32 {
    0.3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            classifier_max_tokens: default_classifier_max_tokens(),
            classifier_temperature: default_classifier_temperature(),
            refiner_max_tokens: default_refiner_max_tokens(),
            refiner_temperature: default_refiner_temperature(),
        }
    }
}

/// Intent classifier thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum LLM confidence to route without asking
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Minimum keyword-fallback confidence to route without asking
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f32,

    /// Recent turns included in the classifier prompt
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

fn default_threshold() -> f32 {
    0.7
}

fn default_fallback_threshold() -> f32 {
    0.2
}

fn default_context_turns() -> usize {
    3
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            fallback_threshold: default_fallback_threshold(),
            context_turns: default_context_turns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Answer characters kept per turn in classifier context
    #[serde(default = "default_answer_preview")]
    pub answer_preview_chars: usize,
}

fn default_capacity() -> usize {
    10
}

fn default_answer_preview() -> usize {
    160
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            answer_preview_chars: default_answer_preview(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rule firings allowed per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_max_steps() -> usize {
    crate::engine::DEFAULT_MAX_STEPS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory with `<subject>.json` files; bundled data when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl TutorConfig {
    /// Search order for `load`
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(p));
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("tutor").join("config.toml"));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        paths
    }

    /// Load config from the first readable candidate, or return defaults
    pub fn load() -> Self {
        for path in Self::candidate_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_path(&path) {
                Ok(config) => return config,
                Err(e) => warn!("Ignoring config {}: {}", path.display(), e),
            }
        }
        info!("No config file found, using defaults");
        Self::default()
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TutorConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save default config to path (for init)
    pub fn save_default(path: &Path) -> Result<()> {
        let content = Self::default().to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TutorError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("classifier.threshold", self.classifier.threshold),
            ("classifier.fallback_threshold", self.classifier.fallback_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(TutorError::Config(format!("{} must be within [0, 1], got {}", name, v)));
            }
        }
        if self.memory.capacity == 0 {
            return Err(TutorError::Config("memory.capacity must be at least 1".to_string()));
        }
        if self.engine.max_steps == 0 {
            return Err(TutorError::Config("engine.max_steps must be at least 1".to_string()));
        }
        Ok(())
    }

    /// API key from the configured env var, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
