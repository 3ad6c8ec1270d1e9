//! Control loop.
//!
//! ```text
//! Planning ─▶ Scheduling ─▶ Executing ─▶ Reflecting ─▶ decide ─┬─▶ Scheduling
//!                                                              └─▶ Stopped
//! ```
//!
//! One cycle is one task attempt. The loop owns the task list and the
//! artifact set for the run and is their only writer; a checkpoint is saved
//! after every cycle so a crashed run can resume at Scheduling.

mod decision;

pub use decision::{decide_next_step, Decision, EndReason};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{latest_with, Artifact, ArtifactContent, PptHtmlDocument};
use crate::config::{OrchestratorConfig, PlanningMode};
use crate::events::{EventSink, ProgressEvent};
use crate::executor::{ExecutionContext, TaskExecutor};
use crate::oracle::ContentOracle;
use crate::planner::{AddTasksContext, Planner, PlanningContext};
use crate::reflector::{ReflectionResult, Reflector, ReflectorConfig};
use crate::scheduler::{self, TaskStatistics};
use crate::search::SearchProvider;
use crate::store::{validate_session_id, ArtifactStore, Checkpoint, CheckpointStore, StoreError};
use crate::task::{TaskId, TaskList, TaskListStatus, TaskStatus};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No checkpoint found for session {0}")]
    CheckpointNotFound(String),

    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    #[error("Failed to load checkpoint: {0}")]
    Store(#[from] StoreError),
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every task ended Completed or Skipped
    Completed,
    /// The loop ended with work left; artifacts are best effort
    Partial,
    /// A critical task failed
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub session_id: Option<String>,
    pub goal: String,
    /// Earlier turns of the conversation, handed to the planner
    pub history: Vec<String>,
    /// Overrides the configured planning mode
    pub planning: Option<PlanningMode>,
}

impl RunRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            session_id: None,
            goal: goal.into(),
            history: Vec::new(),
            planning: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_planning(mut self, planning: PlanningMode) -> Self {
        self.planning = Some(planning);
        self
    }
}

/// What the caller gets back. Partial progress is always included.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session_id: String,
    pub outcome: RunOutcome,
    pub reason: String,
    pub iterations: u32,
    pub statistics: TaskStatistics,
    pub task_list: TaskList,
    pub artifacts: Vec<Artifact>,
}

impl RunReport {
    /// The rendered deck, if the run got that far.
    pub fn final_document(&self) -> Option<&PptHtmlDocument> {
        latest_with(&self.artifacts, ArtifactContent::as_document)
    }
}

/// Collaborators injected into the orchestrator.
pub struct Services {
    pub oracle: Arc<dyn ContentOracle>,
    pub search: Arc<dyn SearchProvider>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub events: Arc<dyn EventSink>,
}

pub struct Orchestrator {
    planner: Planner,
    executor: TaskExecutor,
    reflector: Reflector,
    artifact_store: Arc<dyn ArtifactStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    events: Arc<dyn EventSink>,
    config: OrchestratorConfig,
}

/// Mutable state of one run.
struct RunState {
    task_list: TaskList,
    artifacts: Vec<Artifact>,
    iterations: u32,
}

impl Orchestrator {
    pub fn new(services: Services, config: OrchestratorConfig) -> Self {
        let reflector_config = ReflectorConfig {
            quality_checks: config.quality_checks,
            max_refinements_per_task: config.max_refinements_per_task,
        };
        Self {
            planner: Planner::new(Some(services.oracle.clone())),
            executor: TaskExecutor::new(
                services.oracle.clone(),
                services.search,
                services.artifacts.clone(),
                services.events.clone(),
            ),
            reflector: Reflector::new(Some(services.oracle), reflector_config),
            artifact_store: services.artifacts,
            checkpoints: services.checkpoints,
            events: services.events,
            config,
        }
    }

    /// Plan and run a goal to the end.
    ///
    /// Task failures are reported through [`RunReport::outcome`], never as `Err`.
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, OrchestratorError> {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4().simple()));
        validate_session_id(&session_id)
            .map_err(|_| OrchestratorError::InvalidSession(session_id.clone()))?;

        // Planning
        let existing_artifacts = match self.artifact_store.get_all(&session_id).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::warn!("Could not load existing artifacts for {}: {}", session_id, e);
                Vec::new()
            }
        };
        let mut task_list = match request.planning.unwrap_or(self.config.planning) {
            PlanningMode::Template => Planner::fallback_task_list(&session_id, &request.goal),
            PlanningMode::Oracle => {
                let ctx = PlanningContext {
                    history: request.history,
                    existing_artifacts,
                    refinement_prompt: None,
                };
                self.planner.plan_tasks(&session_id, &request.goal, &ctx).await
            }
        };
        scheduler::initialize_task_list(&mut task_list);
        tracing::info!(
            "Session {} planned with {} tasks",
            session_id,
            task_list.tasks.len()
        );

        let state = RunState {
            task_list,
            artifacts: Vec::new(),
            iterations: 0,
        };
        self.save_checkpoint(&state).await;

        Ok(self.drive(state).await)
    }

    /// Continue a run from its last checkpoint, entering at Scheduling.
    pub async fn resume(&self, session_id: &str) -> Result<RunReport, OrchestratorError> {
        validate_session_id(session_id)
            .map_err(|_| OrchestratorError::InvalidSession(session_id.to_string()))?;
        let checkpoint = self
            .checkpoints
            .load(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::CheckpointNotFound(session_id.to_string()))?;

        let mut state = RunState {
            task_list: checkpoint.task_list,
            artifacts: checkpoint.artifacts,
            iterations: 0,
        };

        if state.task_list.status.is_terminal() {
            tracing::info!("Session {} already finished, nothing to resume", session_id);
            let (outcome, reason) = settled_outcome(&state.task_list);
            return Ok(self.report(state, outcome, reason));
        }

        // The interrupted attempt does not count as a retry.
        for task in state.task_list.tasks.iter_mut() {
            if task.status == TaskStatus::InProgress {
                tracing::info!("Resetting interrupted task {} to ready", task.id);
                task.set_status(TaskStatus::Ready);
            }
        }
        scheduler::refresh_ready(&mut state.task_list);
        state.task_list.status = TaskListStatus::Executing;
        state.task_list.touch();
        tracing::info!(
            "Resuming session {} with {} artifacts",
            session_id,
            state.artifacts.len()
        );

        Ok(self.drive(state).await)
    }

    /// Scheduling → Executing → Reflecting → decide, until Stopped.
    async fn drive(&self, mut state: RunState) -> RunReport {
        let end = loop {
            if state.iterations >= self.config.max_iterations {
                tracing::warn!(
                    "Session {} hit the iteration limit of {}",
                    state.task_list.session_id,
                    self.config.max_iterations
                );
                break EndReason::IterationLimit;
            }
            state.iterations += 1;

            // Scheduling
            let current = scheduler::get_next_task(&state.task_list).map(|t| t.id.clone());

            let reflection = match &current {
                Some(task_id) => {
                    self.execute(&mut state, task_id).await;
                    Some(self.reflect(&mut state, task_id).await)
                }
                None => None,
            };

            self.save_checkpoint(&state).await;

            let current_task = current.as_deref().and_then(|id| state.task_list.get(id));
            match decide_next_step(
                &state.task_list,
                current_task,
                reflection.as_ref(),
                &state.artifacts,
            ) {
                Decision::Continue => continue,
                Decision::End(reason) => break reason,
            }
        };

        self.finish(state, end).await
    }

    /// Executing: one attempt of `task_id`, then the success, retry, skip or
    /// fail transition.
    async fn execute(&self, state: &mut RunState, task_id: &str) {
        let session_id = state.task_list.session_id.clone();
        scheduler::update_task_status(&mut state.task_list, task_id, TaskStatus::InProgress, None, None);

        let Some(task) = state.task_list.get(task_id).cloned() else {
            return;
        };
        self.events.emit(ProgressEvent::TaskStarted {
            session_id: session_id.clone(),
            task_id: task.id.clone(),
            task_type: task.task_type,
            attempt: task.metadata.retry_count + 1,
        });

        let result = {
            let ctx = ExecutionContext::new(&state.task_list, &state.artifacts);
            self.executor.execute_task(&task, &ctx).await
        };

        let status = match (result.success, result.result) {
            (true, Some(output)) => {
                state.artifacts.push(output.artifact.clone());
                scheduler::update_task_status(
                    &mut state.task_list,
                    task_id,
                    TaskStatus::Completed,
                    Some(output),
                    None,
                );
                TaskStatus::Completed
            }
            _ => {
                let error = result
                    .error
                    .unwrap_or_else(|| "task produced no result".to_string());
                self.handle_failure(&mut state.task_list, &task.id, error)
            }
        };

        let error = state.task_list.get(task_id).and_then(|t| t.error.clone());
        self.events.emit(ProgressEvent::TaskUpdated {
            session_id,
            task_id: task_id.to_string(),
            status,
            error,
        });
    }

    /// Retry while retries remain, then skip non-critical tasks and fail
    /// critical ones.
    fn handle_failure(&self, task_list: &mut TaskList, task_id: &str, error: String) -> TaskStatus {
        let Some(task) = task_list.get(task_id) else {
            return TaskStatus::Failed;
        };
        let critical = task.is_critical();

        if task.metadata.has_retries_left() {
            scheduler::retry_task(task_list, task_id, error);
            return TaskStatus::Ready;
        }

        if critical {
            tracing::error!("Critical task {} failed after all retries: {}", task_id, error);
            scheduler::update_task_status(task_list, task_id, TaskStatus::Failed, None, Some(error));
            TaskStatus::Failed
        } else {
            tracing::warn!("Task {} skipped after all retries: {}", task_id, error);
            scheduler::update_task_status(task_list, task_id, TaskStatus::Skipped, None, Some(error));
            TaskStatus::Skipped
        }
    }

    /// Reflecting: evaluate the attempt and append any suggested tasks.
    async fn reflect(&self, state: &mut RunState, task_id: &str) -> ReflectionResult {
        let Some(task) = state.task_list.get(task_id).cloned() else {
            return ReflectionResult {
                needs_new_tasks: false,
                should_continue: false,
                reason: format!("task {} disappeared", task_id),
                new_task_suggestions: Vec::new(),
            };
        };

        let reflection = self
            .reflector
            .reflect(&state.task_list, &task, &state.artifacts)
            .await;
        tracing::debug!("Reflection on {}: {}", task_id, reflection.reason);

        if reflection.needs_new_tasks && reflection.should_continue {
            let added = self
                .planner
                .add_new_tasks(
                    &mut state.task_list,
                    &reflection.reason,
                    AddTasksContext {
                        completed_task: Some(&task),
                        suggestions: reflection.new_task_suggestions.clone(),
                    },
                )
                .await;
            for id in &added {
                if let Some(status) = state.task_list.status_of(id) {
                    self.events.emit(ProgressEvent::TaskUpdated {
                        session_id: state.task_list.session_id.clone(),
                        task_id: id.clone(),
                        status,
                        error: None,
                    });
                }
            }
        }

        reflection
    }

    async fn finish(&self, mut state: RunState, end: EndReason) -> RunReport {
        // A resumed list can carry a critical failure from before the interruption.
        let end = match failed_critical_task(&state.task_list) {
            Some(id) if !matches!(end, EndReason::CriticalFailure(_)) => {
                EndReason::CriticalFailure(id.clone())
            }
            _ => end,
        };
        let outcome = match &end {
            EndReason::CriticalFailure(_) => RunOutcome::Failed,
            _ if scheduler::is_all_tasks_completed(&state.task_list) => RunOutcome::Completed,
            _ => RunOutcome::Partial,
        };
        state.task_list.status = match outcome {
            RunOutcome::Failed => TaskListStatus::Failed,
            RunOutcome::Completed | RunOutcome::Partial => TaskListStatus::Completed,
        };
        state.task_list.touch();
        self.save_checkpoint(&state).await;

        let reason = end.to_string();
        match outcome {
            RunOutcome::Failed => tracing::error!(
                "Session {} failed after {} iterations: {}",
                state.task_list.session_id,
                state.iterations,
                reason
            ),
            _ => tracing::info!(
                "Session {} finished as {} after {} iterations: {}",
                state.task_list.session_id,
                outcome,
                state.iterations,
                reason
            ),
        }

        self.events.emit(ProgressEvent::RunCompleted {
            session_id: state.task_list.session_id.clone(),
            outcome,
            reason: Some(reason.clone()),
        });
        self.report(state, outcome, reason)
    }

    fn report(&self, state: RunState, outcome: RunOutcome, reason: String) -> RunReport {
        RunReport {
            session_id: state.task_list.session_id.clone(),
            outcome,
            reason,
            iterations: state.iterations,
            statistics: scheduler::statistics(&state.task_list),
            task_list: state.task_list,
            artifacts: state.artifacts,
        }
    }

    async fn save_checkpoint(&self, state: &RunState) {
        let checkpoint = Checkpoint::new(state.task_list.clone(), state.artifacts.clone());
        if let Err(e) = self.checkpoints.save(&checkpoint).await {
            tracing::error!(
                "Failed to save checkpoint for session {}: {}",
                state.task_list.session_id,
                e
            );
        }
    }
}

fn failed_critical_task(task_list: &TaskList) -> Option<&TaskId> {
    task_list
        .tasks
        .iter()
        .find(|t| t.status == TaskStatus::Failed && t.is_critical())
        .map(|t| &t.id)
}

/// Outcome of a list that is already terminal.
fn settled_outcome(task_list: &TaskList) -> (RunOutcome, String) {
    match failed_critical_task(task_list) {
        Some(id) => (
            RunOutcome::Failed,
            EndReason::CriticalFailure(id.clone()).to_string(),
        ),
        None if scheduler::is_all_tasks_completed(task_list) => {
            (RunOutcome::Completed, EndReason::AllDone.to_string())
        }
        None => (RunOutcome::Partial, "run already finished".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(statuses: &[TaskStatus]) -> TaskList {
        let mut list = Planner::fallback_task_list("s1", "goal");
        for (task, status) in list.tasks.iter_mut().zip(statuses) {
            task.status = *status;
        }
        list.status = TaskListStatus::Completed;
        list
    }

    #[test]
    fn test_outcome_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RunOutcome::Partial).unwrap(), "partial");
        assert_eq!(RunOutcome::Failed.to_string(), "failed");
    }

    #[test]
    fn test_settled_outcome() {
        use TaskStatus::*;

        let done = finished(&[Completed, Completed, Skipped, Completed, Completed, Completed]);
        assert_eq!(settled_outcome(&done).0, RunOutcome::Completed);

        let aborted = finished(&[Completed, Completed, Completed, Completed, Completed, Failed]);
        let (outcome, reason) = settled_outcome(&aborted);
        assert_eq!(outcome, RunOutcome::Failed);
        assert!(reason.contains(&aborted.tasks[5].id));

        let stalled = finished(&[Completed, Completed, Completed, Completed, Skipped, Pending]);
        assert_eq!(settled_outcome(&stalled).0, RunOutcome::Partial);
    }

    #[test]
    fn test_run_request_builder() {
        let request = RunRequest::new("goal")
            .with_session("s1")
            .with_planning(PlanningMode::Template);
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.planning, Some(PlanningMode::Template));
        assert!(request.history.is_empty());
    }
}
