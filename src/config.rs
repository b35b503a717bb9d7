//! Configuration system for boardroom
//!
//! Configuration is read once at startup from TOML and injected as an
//! immutable [`AppConfig`]. Every section has defaults, so an empty file (or
//! no file at all) yields a runnable configuration. API keys are never stored
//! here, only the names of the environment variables that hold them.

use crate::llm::{ModelBinding, ModelTier};
use crate::roles::RoleId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Locations searched when no explicit `--config` path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["boardroom.toml", "config/boardroom.toml"];

const KNOWN_LLM_PROVIDERS: &[&str] = &["openai", "anthropic", "gemini"];
const KNOWN_SEARCH_PROVIDERS: &[&str] = &["serper"];
/// Upper bound for `[pipeline] retry_attempts`
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub models: ModelsSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub roles: RolesSection,
}

/// Model bindings for the two tiers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsSection {
    #[serde(default = "ModelConfig::default_fast")]
    pub fast: ModelConfig,
    #[serde(default = "ModelConfig::default_deep")]
    pub deep: ModelConfig,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            fast: ModelConfig::default_fast(),
            deep: ModelConfig::default_deep(),
        }
    }
}

impl ModelsSection {
    pub fn for_tier(&self, tier: ModelTier) -> &ModelConfig {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Deep => &self.deep,
        }
    }

    /// Resolve a tier to the model name and sampling settings sent upstream
    pub fn binding(&self, tier: ModelTier) -> ModelBinding {
        let config = self.for_tier(tier);
        ModelBinding {
            tier,
            model: config.model.clone(),
            display_name: config.label().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// One LLM endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Provider name ("openai", "anthropic", "gemini")
    pub provider: String,
    /// Model identifier sent to the provider
    pub model: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    /// Optional temperature (0.0 to 2.0)
    pub temperature: Option<f32>,
    /// Optional max tokens
    pub max_tokens: Option<u32>,
    /// Human-readable label used in reports and logs
    pub display_name: Option<String>,
    /// Override for the provider's API base URL
    pub base_url: Option<String>,
}

impl ModelConfig {
    fn default_fast() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            display_name: Some("Gemini Flash".to_string()),
            base_url: None,
        }
    }

    fn default_deep() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-pro".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: Some(0.5),
            max_tokens: None,
            display_name: Some("Gemini Pro".to_string()),
            base_url: None,
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.model)
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, ConfigError> {
        get_env_var_required(&self.api_key_env)
    }

    fn validate(&self, tier: ModelTier) -> Result<(), ConfigError> {
        if !KNOWN_LLM_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "[models.{tier}] provider '{}' is not one of {}",
                self.provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "[models.{tier}] model must not be empty"
            )));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ConfigError::InvalidConfig(format!(
                    "[models.{tier}] temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }
        Ok(())
    }
}

/// Pipeline execution limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Per-completion timeout in seconds (default: 300)
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    /// Bounded retries for transient provider failures (default: 1, at most 5)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base of the exponential backoff in milliseconds (default: 500)
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    /// Concurrent provider calls allowed across the process (default: 1)
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Directory report files are written to (default: current directory)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_stage_timeout() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_backoff_base() -> u64 {
    500
}

fn default_max_concurrent_calls() -> usize {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base(),
            max_concurrent_calls: default_max_concurrent_calls(),
            output_dir: default_output_dir(),
        }
    }
}

/// Web search collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSection {
    #[serde(default = "default_search_enabled")]
    pub enabled: bool,
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    pub base_url: Option<String>,
}

fn default_search_enabled() -> bool {
    true
}

fn default_search_provider() -> String {
    "serper".to_string()
}

fn default_search_key_env() -> String {
    "SERPER_API_KEY".to_string()
}

fn default_max_results() -> usize {
    5
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            enabled: default_search_enabled(),
            provider: default_search_provider(),
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
            base_url: None,
        }
    }
}

impl SearchSection {
    /// Search API key, if the variable is set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

/// Per-role tier overrides, keyed by role id (e.g. `skeptic = "fast"`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RolesSection {
    #[serde(default)]
    pub overrides: HashMap<String, ModelTier>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from an explicit path, else the first default location that
    /// exists, else built-in defaults. Returns the path actually used.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
            }
        }

        Ok((Self::default(), None))
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.models.fast.validate(ModelTier::Fast)?;
        self.models.deep.validate(ModelTier::Deep)?;

        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "[pipeline] stage_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.retry_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::InvalidConfig(format!(
                "[pipeline] retry_attempts {} exceeds the maximum of {MAX_RETRY_ATTEMPTS}",
                self.pipeline.retry_attempts
            )));
        }
        if self.pipeline.max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidConfig(
                "[pipeline] max_concurrent_calls must be at least 1".to_string(),
            ));
        }

        if self.search.enabled && !KNOWN_SEARCH_PROVIDERS.contains(&self.search.provider.as_str())
        {
            return Err(ConfigError::InvalidConfig(format!(
                "[search] provider '{}' is not supported",
                self.search.provider
            )));
        }

        for role in self.roles.overrides.keys() {
            if RoleId::from_id(role).is_none() {
                return Err(ConfigError::InvalidConfig(format!(
                    "[roles.overrides] unknown role '{role}'"
                )));
            }
        }

        Ok(())
    }

    /// Serialize back to TOML for `config --show`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}
