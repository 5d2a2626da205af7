//! Configuration management
//!
//! This module handles loading, validation, and management of the OnGoal configuration.
//! Configuration is stored in TOML format at ~/.ongoal/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **server**: Bind address and allowed CORS origins
//! - **llm**: Oracle provider selection and per-provider settings
//! - **pipeline**: Default stage toggles and per-stage token limits
//!
//! API keys are never written to the config file. The Anthropic provider
//! reads its key from the environment variable named by
//! `llm.anthropic.api_key_env`.
//!
//! # Examples
//!
//! ```no_run
//! use ongoal_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Provider: {}", config.llm.provider);
//! println!("Listening on {}:{}", config.server.host, config.server.port);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `llm.anthropic.model`
pub const MODEL_ENV_OVERRIDE: &str = "ANTHROPIC_MODEL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Oracle provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Goal pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind (0 picks a free port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Oracle provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Active provider (anthropic, ollama)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Value sent as the `anthropic-version` header
    #[serde(default = "default_anthropic_version")]
    pub api_version: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Goal pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Run goal inference on new conversations
    #[serde(default = "default_true")]
    pub infer: bool,

    /// Run goal merging on new conversations
    #[serde(default = "default_true")]
    pub merge: bool,

    /// Run goal evaluation on new conversations
    #[serde(default = "default_true")]
    pub evaluate: bool,

    #[serde(default = "default_inference_max_tokens")]
    pub inference_max_tokens: u32,

    #[serde(default = "default_merge_max_tokens")]
    pub merge_max_tokens: u32,

    #[serde(default = "default_evaluation_max_tokens")]
    pub evaluation_max_tokens: u32,

    #[serde(default = "default_response_max_tokens")]
    pub response_max_tokens: u32,
}

impl PipelineConfig {
    /// Stage toggles a freshly created conversation starts with
    pub fn default_settings(&self) -> PipelineSettings {
        PipelineSettings {
            infer: self.infer,
            merge: self.merge,
            evaluate: self.evaluate,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:8080".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_inference_max_tokens() -> u32 {
    1000
}

fn default_merge_max_tokens() -> u32 {
    1500
}

fn default_evaluation_max_tokens() -> u32 {
    1000
}

fn default_response_max_tokens() -> u32 {
    2000
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            anthropic: AnthropicConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            api_key_env: default_api_key_env(),
            api_version: default_anthropic_version(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            infer: true,
            merge: true,
            evaluate: true,
            inference_max_tokens: default_inference_max_tokens(),
            merge_max_tokens: default_merge_max_tokens(),
            evaluation_max_tokens: default_evaluation_max_tokens(),
            response_max_tokens: default_response_max_tokens(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.ongoal/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Config::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Created default configuration at {}", path.display());

        let mut config = config;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.ongoal/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".ongoal").join("config.toml"))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var(MODEL_ENV_OVERRIDE) {
            if !model.trim().is_empty() {
                self.llm.anthropic.model = model.trim().to_string();
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["anthropic", "ollama"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.server.host.trim().is_empty() {
            return Err(EngineError::Config("server.host must not be empty".to_string()));
        }

        if self.llm.anthropic.api_key_env.trim().is_empty() {
            return Err(EngineError::Config(
                "llm.anthropic.api_key_env must name an environment variable".to_string(),
            ));
        }

        let limits = [
            ("inference_max_tokens", self.pipeline.inference_max_tokens),
            ("merge_max_tokens", self.pipeline.merge_max_tokens),
            ("evaluation_max_tokens", self.pipeline.evaluation_max_tokens),
            ("response_max_tokens", self.pipeline.response_max_tokens),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(EngineError::Config(format!(
                    "pipeline.{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }
}
