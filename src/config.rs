use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.into()
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_request_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Upper bound on model requests for one user message.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Wall-clock limit for one user message, in seconds.
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
    /// Replaces the binary's built-in system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            time_budget_secs: None,
            system_prompt: None,
        }
    }
}

fn default_max_steps() -> usize {
    16
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SteampipeConfig {
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub steampipe: SteampipeConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|err| ScoutError::Config(format!("Failed to parse configuration: {err}")))?;
        Ok(cfg)
    }

    /// Loads `path` when given (defaults otherwise) and applies environment overrides.
    pub fn from_env_or_file(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("OLLAMA_HOST") {
            self.model.ollama_url = normalize_ollama_host(&host);
        }
        if let Ok(url) = env::var("CLOUDSCOUT_OLLAMA_URL") {
            self.model.ollama_url = url;
        }
        if let Ok(model) = env::var("OLLAMA_MODEL") {
            self.model.model = model;
        }
        if let Ok(model) = env::var("CLOUDSCOUT_MODEL") {
            self.model.model = model;
        }
        if let Ok(timeout) = env::var("CLOUDSCOUT_REQUEST_TIMEOUT_SECS") {
            self.model.request_timeout_secs = parse_env("CLOUDSCOUT_REQUEST_TIMEOUT_SECS", &timeout)?;
        }
        if let Ok(steps) = env::var("CLOUDSCOUT_MAX_STEPS") {
            self.agent.max_steps = parse_env("CLOUDSCOUT_MAX_STEPS", &steps)?;
        }
        if let Ok(budget) = env::var("CLOUDSCOUT_TIME_BUDGET_SECS") {
            self.agent.time_budget_secs = Some(parse_env("CLOUDSCOUT_TIME_BUDGET_SECS", &budget)?);
        }
        if let Ok(url) = env::var("STEAMPIPE_DB") {
            self.steampipe.database_url = Some(url);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ScoutError::Config(format!("{name} has an invalid value `{raw}`")))
}

/// `OLLAMA_HOST` is often a bare `host:port`.
fn normalize_ollama_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
