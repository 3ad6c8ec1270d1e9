//! Configuration management.
//!
//! Everything is read from environment variables:
//! - `OPENROUTER_API_KEY` - Required by the CLI to reach the LLM oracle
//! - `OPENROUTER_ENDPOINT` - Chat-completions URL of a compatible gateway (default: OpenRouter)
//! - `DECKPILOT_MODEL` - Model id (default `google/gemini-3-flash-preview`)
//! - `DECKPILOT_DATA_DIR` - Root for checkpoints and artifacts (default `./.deckpilot`)
//! - `DECKPILOT_PLANNING` - `oracle` or `template` (default `oracle`)
//! - `DECKPILOT_QUALITY_CHECKS` - Ask the oracle to score results (default `true`)
//! - `DECKPILOT_MAX_ITERATIONS` - Control-loop cycle cap (default `200`)
//! - `DECKPILOT_MAX_REFINEMENTS` - Refine tasks per original task (default `1`)

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "google/gemini-3-flash-preview";
pub const DEFAULT_DATA_DIR: &str = "./.deckpilot";
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// Where the initial task list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanningMode {
    /// Ask the oracle, falling back to the template on any failure
    #[default]
    Oracle,
    /// Always use the fixed six-task template
    Template,
}

impl FromStr for PlanningMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oracle" => Ok(Self::Oracle),
            "template" => Ok(Self::Template),
            _ => Err(()),
        }
    }
}

/// Knobs of the control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub planning: PlanningMode,
    /// When false the reflector assumes every result is good (score 80)
    pub quality_checks: bool,
    pub max_iterations: u32,
    pub max_refinements_per_task: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            planning: PlanningMode::Oracle,
            quality_checks: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_refinements_per_task: 1,
        }
    }
}

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter key; `None` when unset
    pub api_key: Option<String>,
    /// Overrides the public OpenRouter endpoint
    pub endpoint: Option<String>,
    pub model: String,
    pub data_dir: PathBuf,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable is set but cannot
    /// be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = OrchestratorConfig::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let planning = match get("DECKPILOT_PLANNING") {
            Some(value) => value
                .parse::<PlanningMode>()
                .map_err(|_| invalid("DECKPILOT_PLANNING", &value))?,
            None => defaults.planning,
        };
        let quality_checks = match get("DECKPILOT_QUALITY_CHECKS") {
            Some(value) => parse_bool("DECKPILOT_QUALITY_CHECKS", &value)?,
            None => defaults.quality_checks,
        };
        let max_iterations = match get("DECKPILOT_MAX_ITERATIONS") {
            Some(value) => match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("DECKPILOT_MAX_ITERATIONS", &value)),
            },
            None => defaults.max_iterations,
        };
        let max_refinements_per_task = match get("DECKPILOT_MAX_REFINEMENTS") {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid("DECKPILOT_MAX_REFINEMENTS", &value))?,
            None => defaults.max_refinements_per_task,
        };

        Ok(Self {
            api_key: get("OPENROUTER_API_KEY"),
            endpoint: get("OPENROUTER_ENDPOINT"),
            model: get("DECKPILOT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            data_dir: get("DECKPILOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            orchestrator: OrchestratorConfig {
                planning,
                quality_checks,
                max_iterations,
                max_refinements_per_task,
            },
        })
    }

    /// The API key, or an error naming the variable to set.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}
