//! Task, dependency and retry-policy types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::TaskOutput;

/// Task identifier, unique within a task list.
pub type TaskId = String;

/// Retries granted to a task whose metadata does not say otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Kind of work a task performs.
///
/// The long names used by older planners are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Analyze the goal into a requirement summary
    #[serde(alias = "analyze_topic")]
    Analyze,
    /// Produce the course configuration (audience, style, page count)
    #[serde(alias = "generate_course_config")]
    Configure,
    /// Produce the content outline
    #[serde(alias = "generate_video_outline")]
    Outline,
    /// Produce one script per slide
    #[serde(alias = "generate_slide_scripts")]
    Script,
    /// Produce the visual theme
    #[serde(alias = "generate_theme")]
    Theme,
    /// Render every page to HTML
    #[serde(alias = "generate_slides", alias = "render_page")]
    Render,
    /// Search the web for supporting material
    #[serde(alias = "search_web")]
    Search,
    /// Re-run another task with a refinement prompt
    #[serde(alias = "refine_content")]
    Refine,
    /// Quality-check another task's output
    #[serde(alias = "validate_result")]
    Validate,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Configure => "configure",
            Self::Outline => "outline",
            Self::Script => "script",
            Self::Theme => "theme",
            Self::Render => "render",
            Self::Search => "search",
            Self::Refine => "refine",
            Self::Validate => "validate",
        }
    }

    /// Whether a failure of this type aborts the run when metadata is silent.
    pub fn is_critical_by_default(&self) -> bool {
        matches!(self, Self::Render)
    }

    /// Whether a refine task may target this type.
    pub fn is_refinable(&self) -> bool {
        matches!(
            self,
            Self::Configure | Self::Outline | Self::Script | Self::Theme
        )
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
///
/// `Pending → Ready → InProgress → {Completed | Failed | Skipped}`, plus the
/// retry edge `Failed → Ready` and the skip edges from `Pending`/`Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// Completed, Failed or Skipped.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Pending, Ready or InProgress: the task still has work ahead of it.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Ready | Self::InProgress)
    }

    /// Completed or Skipped: nothing left to do and nothing went fatally wrong.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// How an upstream task must end for a dependency to be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// Upstream must be Completed.
    Success,
    /// Upstream must be terminal (Completed, Failed or Skipped).
    Any,
    /// Same as `Success` today; reserved for multi-parent aggregation.
    #[default]
    All,
}

impl DependencyCondition {
    /// Evaluate the condition against the upstream task's status.
    pub fn is_satisfied_by(&self, upstream: TaskStatus) -> bool {
        match self {
            Self::Success | Self::All => upstream == TaskStatus::Completed,
            Self::Any => upstream.is_terminal(),
        }
    }
}

/// Edge to an upstream task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: TaskId,
    #[serde(default)]
    pub condition: DependencyCondition,
}

impl TaskDependency {
    pub fn new(task_id: impl Into<TaskId>, condition: DependencyCondition) -> Self {
        Self {
            task_id: task_id.into(),
            condition,
        }
    }

    pub fn success(task_id: impl Into<TaskId>) -> Self {
        Self::new(task_id, DependencyCondition::Success)
    }

    pub fn any(task_id: impl Into<TaskId>) -> Self {
        Self::new(task_id, DependencyCondition::Any)
    }
}

/// Scheduling hints and retry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Expected duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Retries consumed so far; only ever increases within a run
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<bool>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            estimated_duration: None,
            can_retry: None,
            max_retries: None,
            retry_count: 0,
            critical: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TaskMetadata {
    /// Metadata for a freshly planned task.
    pub fn planned(estimated_duration: u32, max_retries: u32, critical: bool) -> Self {
        Self {
            estimated_duration: Some(estimated_duration),
            can_retry: Some(true),
            max_retries: Some(max_retries),
            critical: Some(critical),
            ..Self::default()
        }
    }

    /// Retries this task may consume. `can_retry = false` means none.
    pub fn retry_limit(&self) -> u32 {
        if self.can_retry == Some(false) {
            0
        } else {
            self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
        }
    }

    /// Whether another retry is allowed.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.retry_limit()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A schedulable unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    /// Higher runs first
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl Task {
    /// Create a pending task with a fresh id.
    pub fn new(task_type: TaskType, description: impl Into<String>, priority: i32) -> Self {
        Self {
            id: new_task_id(),
            task_type,
            description: description.into(),
            status: TaskStatus::Pending,
            parameters: Map::new(),
            dependencies: Vec::new(),
            priority,
            result: None,
            error: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_dependency(mut self, dependency: TaskDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Explicit `metadata.critical` wins; otherwise only render is critical.
    pub fn is_critical(&self) -> bool {
        self.metadata
            .critical
            .unwrap_or_else(|| self.task_type.is_critical_by_default())
    }

    /// Whether any dependency points at `task_id`.
    pub fn depends_on(&self, task_id: &str) -> bool {
        self.dependencies.iter().any(|d| d.task_id == task_id)
    }

    /// String parameter lookup.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.metadata.touch();
    }
}

/// Partially specified task as produced by a planner oracle or a reflector
/// suggestion. Missing fields are filled in by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl TaskDraft {
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: None,
            task_type,
            description: description.into(),
            parameters: Map::new(),
            dependencies: Vec::new(),
            priority: None,
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_dependency(mut self, dependency: TaskDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_metadata(mut self, metadata: TaskMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materialize into a pending task. Timestamps are restamped.
    pub fn into_task(self, default_priority: i32) -> Task {
        let now = Utc::now();
        let description = if self.description.trim().is_empty() {
            self.task_type.to_string()
        } else {
            self.description
        };
        Task {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(new_task_id),
            task_type: self.task_type,
            description,
            status: TaskStatus::Pending,
            parameters: self.parameters,
            dependencies: self.dependencies,
            priority: self.priority.unwrap_or(default_priority),
            result: None,
            error: None,
            metadata: TaskMetadata {
                retry_count: 0,
                created_at: now,
                updated_at: now,
                ..self.metadata
            },
        }
    }
}

/// Fresh `task_<uuid>` identifier.
pub fn new_task_id() -> TaskId {
    format!("task_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_table() {
        use TaskStatus::*;
        for status in [Pending, Ready, InProgress, Completed, Failed, Skipped] {
            assert_eq!(
                DependencyCondition::Success.is_satisfied_by(status),
                status == Completed
            );
            assert_eq!(
                DependencyCondition::All.is_satisfied_by(status),
                status == Completed
            );
            assert_eq!(
                DependencyCondition::Any.is_satisfied_by(status),
                matches!(status, Completed | Failed | Skipped)
            );
        }
    }

    #[test]
    fn test_missing_condition_defaults_to_all() {
        let dep: TaskDependency = serde_json::from_str(r#"{"task_id": "a"}"#).unwrap();
        assert_eq!(dep.condition, DependencyCondition::All);
    }

    #[test]
    fn test_legacy_type_names_accepted() {
        let t: TaskType = serde_json::from_str(r#""generate_slides""#).unwrap();
        assert_eq!(t, TaskType::Render);
        let t: TaskType = serde_json::from_str(r#""search_web""#).unwrap();
        assert_eq!(t, TaskType::Search);
        assert_eq!(serde_json::to_string(&TaskType::Configure).unwrap(), r#""configure""#);
    }

    #[test]
    fn test_critical_defaults() {
        let render = Task::new(TaskType::Render, "render", 10);
        assert!(render.is_critical());
        let theme = Task::new(TaskType::Theme, "theme", 10);
        assert!(!theme.is_critical());

        let overridden = Task::new(TaskType::Theme, "theme", 10).with_metadata(TaskMetadata {
            critical: Some(true),
            ..TaskMetadata::default()
        });
        assert!(overridden.is_critical());
    }

    #[test]
    fn test_retry_limit() {
        let mut meta = TaskMetadata::default();
        assert_eq!(meta.retry_limit(), DEFAULT_MAX_RETRIES);
        meta.max_retries = Some(1);
        assert!(meta.has_retries_left());
        meta.retry_count = 1;
        assert!(!meta.has_retries_left());

        meta.can_retry = Some(false);
        meta.retry_count = 0;
        assert_eq!(meta.retry_limit(), 0);
    }

    #[test]
    fn test_draft_fills_defaults() {
        let draft: TaskDraft = serde_json::from_str(r#"{"type": "outline"}"#).unwrap();
        let task = draft.into_task(10);
        assert!(task.id.starts_with("task_"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, 10);
        assert_eq!(task.description, "outline");
        assert_eq!(task.metadata.retry_count, 0);
    }
}
