use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config as cfg;
use serde::{Deserialize, Serialize};

/// Model service configuration. The API key is never serialized back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier sent with every request. Overridable per run.
    #[serde(default = "ModelConfig::default_model")]
    pub model: String,
    /// Chat-completions base URL of an OpenAI-compatible service.
    #[serde(default = "ModelConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ModelConfig::default_api_key", skip_serializing)]
    pub api_key: String,
    #[serde(default = "ModelConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default = "ModelConfig::default_max_output_tokens")]
    pub max_output_tokens: usize,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Per-request timeout in seconds.
    #[serde(default = "ModelConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per payload, including the first.
    #[serde(default = "ModelConfig::default_max_retries")]
    pub max_retries: u32,
}

impl ModelConfig {
    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_api_key() -> String {
        env::var("ROUTELENS__MODEL__API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .unwrap_or_default()
    }

    fn default_temperature() -> f32 {
        0.2
    }

    fn default_max_output_tokens() -> usize {
        2048
    }

    fn default_timeout_secs() -> u64 {
        60
    }

    fn default_max_retries() -> u32 {
        3
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            base_url: Self::default_base_url(),
            api_key: Self::default_api_key(),
            temperature: Self::default_temperature(),
            max_output_tokens: Self::default_max_output_tokens(),
            top_p: None,
            top_k: None,
            timeout_secs: Self::default_timeout_secs(),
            max_retries: Self::default_max_retries(),
        }
    }
}

/// Filesystem locations used by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the analyzed project's route files.
    #[serde(default = "PathsConfig::default_routes_dir")]
    pub routes_dir: PathBuf,
    /// Request-artifact directory, owned by the orchestrator per run.
    #[serde(default = "PathsConfig::default_payload_dir")]
    pub payload_dir: PathBuf,
    /// Append-only insights store.
    #[serde(default = "PathsConfig::default_insights_dir")]
    pub insights_dir: PathBuf,
}

impl PathsConfig {
    fn default_routes_dir() -> PathBuf {
        PathBuf::from("routes")
    }

    fn default_payload_dir() -> PathBuf {
        PathBuf::from("analysis_payloads")
    }

    fn default_insights_dir() -> PathBuf {
        PathBuf::from("ai_insights")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            routes_dir: Self::default_routes_dir(),
            payload_dir: Self::default_payload_dir(),
            insights_dir: Self::default_insights_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Layered load: `default.toml`, then `{env}.toml`, then `local.toml`,
    /// then `ROUTELENS__*` environment variables.
    pub fn load_from_sources(config_dir: &Path, env_name: &str) -> Result<Self> {
        let settings: Settings = cfg::Config::builder()
            .add_source(cfg::File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                cfg::File::from(config_dir.join(format!("{}.toml", env_name))).required(false),
            )
            .add_source(cfg::File::from(config_dir.join("local.toml")).required(false))
            .add_source(cfg::Environment::with_prefix("ROUTELENS").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(settings)
    }

    pub fn load() -> Result<Self> {
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let settings = Self::load_from_sources(&Self::default_config_dir(), &env_name)?;
        settings.validate()?;
        Ok(settings)
    }

    /// `./config/` if present, else the current directory.
    pub fn default_config_dir() -> PathBuf {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let project_config = cwd.join("config");
        if project_config.exists() {
            return project_config;
        }
        cwd
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.model.model.trim().is_empty(),
            "model.model cannot be empty"
        );
        anyhow::ensure!(
            !self.model.base_url.trim().is_empty(),
            "model.base_url cannot be empty"
        );
        anyhow::ensure!(self.model.max_retries >= 1, "model.max_retries must be >= 1");
        anyhow::ensure!(
            (0.0..=2.0).contains(&self.model.temperature),
            "model.temperature must be 0.0..=2.0"
        );
        anyhow::ensure!(
            self.model.max_output_tokens > 0,
            "model.max_output_tokens must be > 0"
        );
        Ok(())
    }
}
