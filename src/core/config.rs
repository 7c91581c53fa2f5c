//! Typed application settings.
//!
//! Settings are read from a YAML file (`ASKDOC_CONFIG_PATH`, falling back to
//! `config.yml` next to the binary) and merged with environment overrides
//! for secrets. Every section has usable defaults except provider API keys,
//! which must be present before the pipeline is built.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub const CONFIG_PATH_ENV: &str = "ASKDOC_CONFIG_PATH";
pub const EMBEDDING_API_KEY_ENV: &str = "ASKDOC_EMBEDDING_API_KEY";
pub const COMPLETION_API_KEY_ENV: &str = "ASKDOC_COMPLETION_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub retrieval: RetrievalSettings,
    pub prompt: PromptSettings,
    pub embedding: EmbeddingSettings,
    pub completion: CompletionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            port: 8080,
            log_dir: data_dir.join("logs"),
            data_dir,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9100".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Admitted requests per window for one (user, endpoint) key.
    pub limit: u32,
    /// Fixed window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Matches at or below this cosine similarity are discarded.
    pub similarity_threshold: f32,
    /// Maximum matches placed into the prompt.
    pub top_k: usize,
    /// Output dimension of the embedding model; vectors of any other
    /// length are rejected before comparison.
    pub embedding_dim: usize,
    /// Per-match content snippet cap in characters.
    pub snippet_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.5,
            top_k: 3,
            embedding_dim: 768,
            snippet_chars: 700,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Assistant persona used when no grounding passages are available.
    pub persona: String,
    /// Per-passage content cap in characters inside the system instruction.
    pub passage_chars: usize,
    /// Per-passage title cap in characters.
    pub title_chars: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            persona: "You are a helpful assistant that answers questions about the \
                      user's documents."
                .to_string(),
            passage_chars: 1200,
            title_chars: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Inputs longer than this are truncated before submission.
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "nomic-embed-text-v1.5".to_string(),
            api_key: None,
            max_input_chars: 8000,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl Settings {
    /// Load settings from the configured YAML file, then apply environment
    /// overrides. A missing file yields defaults; a malformed file is an
    /// error rather than a silent fallback.
    pub fn load() -> Result<Self, ApiError> {
        let path = config_path();
        let mut settings = match fs::read_to_string(&path) {
            Ok(contents) => serde_yaml::from_str::<Settings>(&contents).map_err(|e| {
                ApiError::Unknown(format!("failed to parse {}: {}", path.display(), e))
            })?,
            Err(_) => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var(EMBEDDING_API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.embedding.api_key = Some(key);
            }
        }
        if let Ok(key) = env::var(COMPLETION_API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.completion.api_key = Some(key);
            }
        }
    }
}

impl EmbeddingSettings {
    pub fn require_api_key(&self) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ApiError::ConfigurationMissing(EMBEDDING_API_KEY_ENV.to_string()))
    }
}

impl CompletionSettings {
    pub fn require_api_key(&self) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ApiError::ConfigurationMissing(COMPLETION_API_KEY_ENV.to_string()))
    }
}

fn config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from("config.yml")
}

fn default_data_dir() -> PathBuf {
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".askdoc")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let settings = Settings::default();
        assert_eq!(settings.rate_limit.limit, 10);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.retrieval.top_k, 3);
        assert_eq!(settings.retrieval.embedding_dim, 768);
        assert!(settings.completion.api_key.is_none());
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_sections() {
        let yaml = "rate_limit:\n  limit: 3\n  window_secs: 10\n";
        let settings: Settings = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(settings.rate_limit.limit, 3);
        assert_eq!(settings.rate_limit.window_secs, 10);
        // untouched sections fall back to defaults
        assert_eq!(settings.retrieval.similarity_threshold, 0.5);
        assert_eq!(settings.completion.max_tokens, 1024);
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let completion = CompletionSettings::default();
        let err = completion.require_api_key().unwrap_err();
        assert!(matches!(err, ApiError::ConfigurationMissing(_)));
    }
}
