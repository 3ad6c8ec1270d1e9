//! The continue/end decision taken after every cycle.

use crate::artifact::Artifact;
use crate::executor::{has_required_artifacts, missing_artifacts};
use crate::reflector::ReflectionResult;
use crate::scheduler::{are_dependencies_satisfied, get_next_task};
use crate::task::{Task, TaskId, TaskList, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    End(EndReason),
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// No task has work left
    AllDone,
    /// A critical task failed with no retries left
    CriticalFailure(TaskId),
    /// Work remains but nothing can run: unmet dependencies or missing inputs
    Stalled(Option<TaskId>),
    /// The cycle cap was reached
    IterationLimit,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllDone => write!(f, "all tasks completed"),
            Self::CriticalFailure(id) => write!(f, "critical task {} failed", id),
            Self::Stalled(Some(id)) => write!(f, "task {} cannot run yet", id),
            Self::Stalled(None) => write!(f, "no runnable task remains"),
            Self::IterationLimit => write!(f, "iteration limit reached"),
        }
    }
}

/// Decide whether the loop goes back to scheduling.
///
/// `current` is the task attempted this cycle, as it stands after its status
/// update; `None` when scheduling found nothing ready.
pub fn decide_next_step(
    task_list: &TaskList,
    current: Option<&Task>,
    reflection: Option<&ReflectionResult>,
    artifacts: &[Artifact],
) -> Decision {
    let Some(current) = current else {
        // Nothing was ready, so leftover Pending tasks can never start.
        if task_list.has_active_tasks() {
            return Decision::End(EndReason::Stalled(None));
        }
        return Decision::End(EndReason::AllDone);
    };

    if reflection.is_some_and(|r| r.needs_new_tasks && r.should_continue) {
        return Decision::Continue;
    }

    match current.status {
        TaskStatus::Completed | TaskStatus::Skipped => {}
        TaskStatus::Failed => {
            if current.metadata.has_retries_left() {
                return Decision::Continue;
            }
            if current.is_critical() {
                return Decision::End(EndReason::CriticalFailure(current.id.clone()));
            }
        }
        TaskStatus::Ready | TaskStatus::Pending => return Decision::Continue,
        TaskStatus::InProgress => {}
    }

    if !task_list.has_active_tasks() {
        return Decision::End(EndReason::AllDone);
    }

    match get_next_task(task_list) {
        Some(next)
            if are_dependencies_satisfied(next, &task_list.tasks)
                && has_required_artifacts(next, task_list, artifacts) =>
        {
            Decision::Continue
        }
        Some(next) => {
            tracing::warn!(
                "Task {} ({}) is ready but cannot run, missing inputs: {:?}",
                next.id,
                next.task_type,
                missing_artifacts(next, task_list, artifacts)
            );
            Decision::End(EndReason::Stalled(Some(next.id.clone())))
        }
        None => Decision::End(EndReason::Stalled(None)),
    }
}
