//! Content-generation oracle.
//!
//! Everything that needs generated content (plans, deck artifacts, quality
//! verdicts) goes through [`ContentOracle::generate`]: structured JSON in,
//! structured JSON out. The orchestration core never sees prompts or models.

mod llm;

pub use llm::LlmOracle;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What the oracle is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    /// A full task plan for a goal
    TaskPlan,
    /// A single follow-up task for a running plan
    TaskSuggestion,
    Analysis,
    CourseConfig,
    Outline,
    SlideScripts,
    Theme,
    /// HTML for one slide
    SlidePage,
    /// Quality verdict over a task result
    QualityCheck,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskPlan => "task_plan",
            Self::TaskSuggestion => "task_suggestion",
            Self::Analysis => "analysis",
            Self::CourseConfig => "course_config",
            Self::Outline => "outline",
            Self::SlideScripts => "slide_scripts",
            Self::Theme => "theme",
            Self::SlidePage => "slide_page",
            Self::QualityCheck => "quality_check",
        }
    }
}

impl std::fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle request failed: {0}")]
    Request(String),

    #[error("Malformed {kind} output: {message}")]
    Malformed {
        kind: GenerationKind,
        message: String,
    },
}

#[async_trait]
pub trait ContentOracle: Send + Sync {
    async fn generate(&self, kind: GenerationKind, inputs: Value) -> Result<Value, OracleError>;
}

/// Generate and deserialize into `T`. A shape mismatch is [`OracleError::Malformed`].
pub async fn generate_as<T: DeserializeOwned>(
    oracle: &dyn ContentOracle,
    kind: GenerationKind,
    inputs: Value,
) -> Result<T, OracleError> {
    let value = oracle.generate(kind, inputs).await?;
    serde_json::from_value(value).map_err(|e| OracleError::Malformed {
        kind,
        message: e.to_string(),
    })
}
