//! Executor dispatch.
//!
//! Routes a task to the handler registered for its type, checks that the
//! artifacts it consumes exist, records the artifact it produces and turns
//! every outcome into an [`ExecutionResult`]. Errors never escape
//! [`TaskExecutor::execute_task`].

mod handlers;

pub use handlers::{ContentHandler, RenderHandler, SearchHandler, ValidateHandler};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{
    has_all_kinds, latest_of_kind, next_version, Artifact, ArtifactContent, ArtifactKind,
};
use crate::events::{EventSink, ProgressEvent};
use crate::oracle::{ContentOracle, OracleError};
use crate::search::{SearchError, SearchProvider};
use crate::store::ArtifactStore;
use crate::task::{Task, TaskList, TaskType};

/// What a successful task leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub artifact: Artifact,
    /// For refine tasks, the task whose output was refined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_task_id: Option<String>,
}

impl TaskOutput {
    pub fn artifact_id(&self) -> &str {
        &self.artifact.id
    }
}

/// Uniform outcome of one task attempt.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub result: Option<TaskOutput>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    fn succeeded(output: TaskOutput, started: Instant) -> Self {
        Self {
            success: true,
            result: Some(output),
            error: None,
            execution_time_ms: elapsed_ms(started),
        }
    }

    fn failed(error: String, started: Instant) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            execution_time_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Required artifact missing: {0}")]
    MissingArtifact(ArtifactKind),

    #[error("No handler registered for task type {0}")]
    UnknownTaskType(TaskType),

    #[error("Target task {0} not found")]
    TargetMissing(String),

    #[error("Target task {0} has no result")]
    TargetHasNoResult(String),

    #[error("Refinement not supported for task type: {0}")]
    RefinementUnsupported(TaskType),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Read-only view of the run handed to each handler.
#[derive(Debug, Clone)]
pub struct ExecutionContext<'a> {
    pub session_id: &'a str,
    pub topic: &'a str,
    /// Every artifact produced so far, in write order
    pub artifacts: &'a [Artifact],
    pub task_list: &'a TaskList,
    pub refinement_prompt: Option<String>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(task_list: &'a TaskList, artifacts: &'a [Artifact]) -> Self {
        Self {
            session_id: &task_list.session_id,
            topic: &task_list.topic,
            artifacts,
            task_list,
            refinement_prompt: None,
        }
    }

    pub fn with_refinement(&self, prompt: impl Into<String>) -> Self {
        Self {
            refinement_prompt: Some(prompt.into()),
            ..self.clone()
        }
    }

    /// Latest payload of `kind`, or [`ExecutionError::MissingArtifact`].
    pub fn require<T>(
        &self,
        kind: ArtifactKind,
        pick: fn(&ArtifactContent) -> Option<&T>,
    ) -> Result<&'a T, ExecutionError>
    where
        T: 'a,
    {
        crate::artifact::latest_with(self.artifacts, pick)
            .ok_or(ExecutionError::MissingArtifact(kind))
    }

    /// Latest payload matched by `pick`, if any.
    pub fn optional<T>(&self, pick: fn(&ArtifactContent) -> Option<&T>) -> Option<&'a T>
    where
        T: 'a,
    {
        crate::artifact::latest_with(self.artifacts, pick)
    }
}

/// Artifact kinds a task type consumes.
///
/// Also used by the control loop to tell whether a task can run yet.
pub fn required_artifacts(task_type: TaskType) -> &'static [ArtifactKind] {
    match task_type {
        TaskType::Configure => &[ArtifactKind::Analysis],
        TaskType::Outline => &[ArtifactKind::CourseConfig],
        TaskType::Script => &[ArtifactKind::Outline, ArtifactKind::CourseConfig],
        TaskType::Theme => &[ArtifactKind::CourseConfig, ArtifactKind::Outline],
        TaskType::Render => &[ArtifactKind::ScriptSet, ArtifactKind::Theme],
        TaskType::Analyze | TaskType::Search | TaskType::Refine | TaskType::Validate => &[],
    }
}

/// Task type whose inputs `task` consumes. Refine tasks inherit their target's.
fn consumed_type(task: &Task, task_list: &TaskList) -> TaskType {
    match task.task_type {
        TaskType::Refine => refine_target_id(task)
            .and_then(|id| task_list.get(id))
            .map(|t| t.task_type)
            .unwrap_or(TaskType::Refine),
        other => other,
    }
}

/// Whether every artifact `task` consumes already exists.
pub fn has_required_artifacts(task: &Task, task_list: &TaskList, artifacts: &[Artifact]) -> bool {
    has_all_kinds(artifacts, required_artifacts(consumed_type(task, task_list)))
}

/// Artifact kinds `task` consumes that do not exist yet.
pub fn missing_artifacts(task: &Task, task_list: &TaskList, artifacts: &[Artifact]) -> Vec<ArtifactKind> {
    required_artifacts(consumed_type(task, task_list))
        .iter()
        .copied()
        .filter(|kind| latest_of_kind(artifacts, *kind).is_none())
        .collect()
}

/// Id of the task a refine or validate task points at.
pub(crate) fn refine_target_id(task: &Task) -> Option<&str> {
    task.parameter_str("task_id")
        .or_else(|| task.parameter_str("taskId"))
}

/// Produces the artifact content for one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ArtifactContent, ExecutionError>;
}

pub struct TaskExecutor {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
    artifact_store: Arc<dyn ArtifactStore>,
    events: Arc<dyn EventSink>,
}

impl TaskExecutor {
    /// Executor with the built-in handler for every task type.
    pub fn new(
        oracle: Arc<dyn ContentOracle>,
        search: Arc<dyn SearchProvider>,
        artifact_store: Arc<dyn ArtifactStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let mut executor = Self {
            handlers: HashMap::new(),
            artifact_store,
            events: events.clone(),
        };

        for task_type in [
            TaskType::Analyze,
            TaskType::Configure,
            TaskType::Outline,
            TaskType::Script,
            TaskType::Theme,
        ] {
            executor.register(Arc::new(ContentHandler::new(task_type, oracle.clone())));
        }
        executor.register(Arc::new(RenderHandler::new(oracle.clone(), events)));
        executor.register(Arc::new(SearchHandler::new(search)));
        executor.register(Arc::new(ValidateHandler::new(oracle)));
        executor
    }

    /// Install or replace the handler for `handler.task_type()`.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    /// Run one attempt of `task`. Never fails; errors become
    /// `ExecutionResult { success: false, .. }`.
    pub async fn execute_task(&self, task: &Task, ctx: &ExecutionContext<'_>) -> ExecutionResult {
        let started = Instant::now();
        tracing::info!("Executing task {} ({}): {}", task.id, task.task_type, task.description);

        match self.run(task, ctx).await {
            Ok(output) => {
                tracing::info!(
                    "Task {} produced {} in {}ms",
                    task.id,
                    output.artifact.id,
                    started.elapsed().as_millis()
                );
                ExecutionResult::succeeded(output, started)
            }
            Err(e) => {
                tracing::warn!("Task {} failed: {}", task.id, e);
                ExecutionResult::failed(e.to_string(), started)
            }
        }
    }

    async fn run(&self, task: &Task, ctx: &ExecutionContext<'_>) -> Result<TaskOutput, ExecutionError> {
        let (content, refined_task_id) = match task.task_type {
            TaskType::Refine => {
                let (content, target) = self.refine(task, ctx).await?;
                (content, Some(target))
            }
            task_type => {
                check_required(task_type, ctx)?;
                (self.handler(task_type)?.handle(task, ctx).await?, None)
            }
        };

        let kind = content.kind();
        let artifact = Artifact::new(
            format!("art_{}_{}", kind, task.id),
            content,
            next_version(ctx.artifacts, kind),
        );
        self.record(ctx.session_id, &artifact).await;

        Ok(TaskOutput {
            artifact,
            refined_task_id,
        })
    }

    /// Re-run the target's handler with a refinement prompt built from the
    /// reported issues.
    async fn refine(
        &self,
        task: &Task,
        ctx: &ExecutionContext<'_>,
    ) -> Result<(ArtifactContent, String), ExecutionError> {
        let target_id = refine_target_id(task)
            .ok_or_else(|| ExecutionError::InvalidInput("refine task has no task_id".to_string()))?;
        let target = ctx
            .task_list
            .get(target_id)
            .ok_or_else(|| ExecutionError::TargetMissing(target_id.to_string()))?;
        if !target.task_type.is_refinable() {
            return Err(ExecutionError::RefinementUnsupported(target.task_type));
        }
        check_required(target.task_type, ctx)?;

        let issues: Vec<&str> = task
            .parameters
            .get("issues")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|i| i.as_str()).collect())
            .unwrap_or_default();
        let prompt = if issues.is_empty() {
            "Improve the overall quality of the content.".to_string()
        } else {
            format!("Revise the content to address these issues: {}", issues.join("; "))
        };

        tracing::info!("Refining task {} ({}) via {}", target.id, target.task_type, task.id);
        let refined_ctx = ctx.with_refinement(prompt);
        let content = self
            .handler(target.task_type)?
            .handle(target, &refined_ctx)
            .await?;
        Ok((content, target.id.clone()))
    }

    fn handler(&self, task_type: TaskType) -> Result<&Arc<dyn TaskHandler>, ExecutionError> {
        self.handlers
            .get(&task_type)
            .ok_or(ExecutionError::UnknownTaskType(task_type))
    }

    async fn record(&self, session_id: &str, artifact: &Artifact) {
        if let Err(e) = self.artifact_store.put(session_id, artifact).await {
            tracing::error!("Failed to save artifact {}: {}", artifact.id, e);
        }
        self.events.emit(ProgressEvent::ArtifactProduced {
            session_id: session_id.to_string(),
            artifact_id: artifact.id.clone(),
            kind: artifact.kind(),
            version: artifact.version,
        });
    }
}

fn check_required(task_type: TaskType, ctx: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
    match required_artifacts(task_type)
        .iter()
        .find(|kind| latest_of_kind(ctx.artifacts, **kind).is_none())
    {
        Some(kind) => Err(ExecutionError::MissingArtifact(*kind)),
        None => Ok(()),
    }
}
