//! Scheduler - dependency resolution and task selection over a [`TaskList`].
//!
//! All functions are synchronous and operate on a list the caller owns
//! exclusively; the control loop is the only writer.

use serde::Serialize;

use crate::executor::TaskOutput;
use crate::task::{Task, TaskId, TaskList, TaskListStatus, TaskStatus};

/// Whether every dependency of `task` resolves and meets its condition.
///
/// A dependency on an id that is not in `all_tasks` is never satisfied.
pub fn are_dependencies_satisfied(task: &Task, all_tasks: &[Task]) -> bool {
    task.dependencies.iter().all(|dep| {
        match all_tasks.iter().find(|t| t.id == dep.task_id) {
            Some(upstream) => dep.condition.is_satisfied_by(upstream.status),
            None => {
                tracing::warn!(
                    "Task {} depends on missing task {}",
                    task.id,
                    dep.task_id
                );
                false
            }
        }
    })
}

/// Highest-priority Ready task; ties go to the earliest inserted.
///
/// Does not change any status.
pub fn get_next_task(task_list: &TaskList) -> Option<&Task> {
    let next = task_list
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Ready)
        .min_by_key(|t| std::cmp::Reverse(t.priority));

    match next {
        Some(task) => tracing::debug!(
            "Next task: {} ({}) with priority {}",
            task.id,
            task.task_type,
            task.priority
        ),
        None => tracing::debug!("No ready tasks found"),
    }

    next
}

/// Set a task's status, result and error, then promote every Pending
/// dependent whose dependencies are now all satisfied.
///
/// Returns the ids of the tasks that became Ready. Tasks that are already
/// Ready, InProgress or terminal are never touched by the cascade.
pub fn update_task_status(
    task_list: &mut TaskList,
    task_id: &str,
    status: TaskStatus,
    result: Option<TaskOutput>,
    error: Option<String>,
) -> Vec<TaskId> {
    let Some(task) = task_list.get_mut(task_id) else {
        tracing::warn!("Task {} not found", task_id);
        return Vec::new();
    };

    let old_status = task.status;
    task.status = status;
    task.result = result;
    task.error = error;
    task.metadata.touch();
    task_list.touch();

    tracing::info!("Task {} status updated: {} -> {}", task_id, old_status, status);

    promote_dependents_of(task_list, task_id)
}

/// Mark every zero-dependency task Ready and start executing the list.
pub fn initialize_task_list(task_list: &mut TaskList) {
    for task in task_list.tasks.iter_mut() {
        if task.dependencies.is_empty() && task.status == TaskStatus::Pending {
            task.set_status(TaskStatus::Ready);
            tracing::debug!("Task {} initialized as ready", task.id);
        }
    }
    task_list.status = TaskListStatus::Executing;
    task_list.touch();
}

/// Promote every Pending task whose dependencies are satisfied.
///
/// Used after appending tasks and when resuming from a checkpoint.
pub fn refresh_ready(task_list: &mut TaskList) -> Vec<TaskId> {
    let ready: Vec<TaskId> = task_list
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| are_dependencies_satisfied(t, &task_list.tasks))
        .map(|t| t.id.clone())
        .collect();

    for id in &ready {
        if let Some(task) = task_list.get_mut(id) {
            task.set_status(TaskStatus::Ready);
            tracing::info!("Task {} is now ready to execute", id);
        }
    }
    ready
}

/// Take the retry edge: record the error, bump `retry_count` and put the task
/// back to Ready. Dependencies are known satisfied, so it skips Pending.
///
/// Returns false when the task is missing or has no retries left.
pub fn retry_task(task_list: &mut TaskList, task_id: &str, error: impl Into<String>) -> bool {
    let Some(task) = task_list.get_mut(task_id) else {
        return false;
    };

    if !task.metadata.has_retries_left() {
        tracing::warn!("Task {} cannot be retried", task_id);
        return false;
    }

    task.metadata.retry_count += 1;
    task.error = Some(error.into());
    task.result = None;
    task.set_status(TaskStatus::Ready);
    task_list.touch();

    let task = &task_list.tasks.iter().find(|t| t.id == task_id);
    if let Some(task) = task {
        tracing::warn!(
            "Task {} retry {}/{} scheduled",
            task_id,
            task.metadata.retry_count,
            task.metadata.retry_limit()
        );
    }
    true
}

/// Skip a Pending or Ready task and cascade to its dependents.
///
/// Returns the newly Ready dependents, or None if the task cannot be skipped.
pub fn skip_task(task_list: &mut TaskList, task_id: &str) -> Option<Vec<TaskId>> {
    let task = task_list.get_mut(task_id)?;
    if !matches!(task.status, TaskStatus::Pending | TaskStatus::Ready) {
        return None;
    }

    task.set_status(TaskStatus::Skipped);
    task_list.touch();
    tracing::info!("Task {} skipped", task_id);

    Some(promote_dependents_of(task_list, task_id))
}

/// Every task is Completed or Skipped.
pub fn is_all_tasks_completed(task_list: &TaskList) -> bool {
    task_list.tasks.iter().all(|t| t.status.is_done())
}

pub fn has_failed_tasks(task_list: &TaskList) -> bool {
    task_list
        .tasks
        .iter()
        .any(|t| t.status == TaskStatus::Failed)
}

/// Count of tasks per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatistics {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn statistics(task_list: &TaskList) -> TaskStatistics {
    let mut stats = TaskStatistics {
        total: task_list.tasks.len(),
        ..TaskStatistics::default()
    };
    for task in &task_list.tasks {
        match task.status {
            TaskStatus::Pending => stats.pending += 1,
            TaskStatus::Ready => stats.ready += 1,
            TaskStatus::InProgress => stats.in_progress += 1,
            TaskStatus::Completed => stats.completed += 1,
            TaskStatus::Failed => stats.failed += 1,
            TaskStatus::Skipped => stats.skipped += 1,
        }
    }
    stats
}

/// Re-evaluate only the tasks that reference `task_id`.
fn promote_dependents_of(task_list: &mut TaskList, task_id: &str) -> Vec<TaskId> {
    let newly_ready: Vec<TaskId> = task_list
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && t.depends_on(task_id))
        .filter(|t| are_dependencies_satisfied(t, &task_list.tasks))
        .map(|t| t.id.clone())
        .collect();

    for id in &newly_ready {
        if let Some(task) = task_list.get_mut(id) {
            task.set_status(TaskStatus::Ready);
            tracing::info!("Task {} is now ready to execute", id);
        }
    }
    newly_ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskDependency, TaskMetadata, TaskType};

    fn task(id: &str, priority: i32) -> Task {
        let mut t = Task::new(TaskType::Outline, id, priority);
        t.id = id.to_string();
        t
    }

    fn list(tasks: Vec<Task>) -> TaskList {
        TaskList::new("session", "topic", tasks)
    }

    #[test]
    fn test_next_task_picks_highest_priority() {
        let mut tl = list(vec![task("low", 1), task("high", 9), task("mid", 5)]);
        initialize_task_list(&mut tl);
        assert_eq!(get_next_task(&tl).unwrap().id, "high");
        // selection never mutates
        assert_eq!(tl.status_of("high"), Some(TaskStatus::Ready));
    }

    #[test]
    fn test_next_task_ties_go_to_earliest() {
        let mut tl = list(vec![task("first", 5), task("second", 5), task("third", 5)]);
        initialize_task_list(&mut tl);
        assert_eq!(get_next_task(&tl).unwrap().id, "first");

        tl.get_mut("first").unwrap().status = TaskStatus::Completed;
        assert_eq!(get_next_task(&tl).unwrap().id, "second");
    }

    #[test]
    fn test_next_task_none_without_ready() {
        let tl = list(vec![task("a", 1)]);
        assert!(get_next_task(&tl).is_none());
    }

    #[test]
    fn test_initialize_marks_roots_ready() {
        let root = task("root", 10);
        let child = task("child", 10).with_dependency(TaskDependency::success("root"));
        let mut tl = list(vec![root, child]);
        initialize_task_list(&mut tl);

        assert_eq!(tl.status_of("root"), Some(TaskStatus::Ready));
        assert_eq!(tl.status_of("child"), Some(TaskStatus::Pending));
        assert_eq!(tl.status, TaskListStatus::Executing);
    }

    #[test]
    fn test_cascade_promotes_all_unblocked_dependents() {
        let a = task("a", 10);
        let b = task("b", 10).with_dependency(TaskDependency::success("a"));
        let c = task("c", 10).with_dependency(TaskDependency::success("a"));
        let blocked = task("d", 10)
            .with_dependency(TaskDependency::success("a"))
            .with_dependency(TaskDependency::success("c"));
        let mut tl = list(vec![a, b, c, blocked]);
        initialize_task_list(&mut tl);

        let ready = update_task_status(&mut tl, "a", TaskStatus::Completed, None, None);
        assert_eq!(ready, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(tl.status_of("d"), Some(TaskStatus::Pending));

        // idempotent: re-completing promotes nothing new
        let again = update_task_status(&mut tl, "a", TaskStatus::Completed, None, None);
        assert!(again.is_empty());
    }

    #[test]
    fn test_cascade_never_repromotes_in_progress() {
        let a = task("a", 10);
        let b = task("b", 10).with_dependency(TaskDependency::any("a"));
        let mut tl = list(vec![a, b]);
        initialize_task_list(&mut tl);
        tl.get_mut("b").unwrap().status = TaskStatus::InProgress;

        let ready = update_task_status(&mut tl, "a", TaskStatus::Completed, None, None);
        assert!(ready.is_empty());
        assert_eq!(tl.status_of("b"), Some(TaskStatus::InProgress));
    }

    #[test]
    fn test_skipped_upstream_releases_only_any_dependents() {
        let up = task("up", 10);
        let on_any = task("any", 10).with_dependency(TaskDependency::any("up"));
        let on_success = task("success", 10).with_dependency(TaskDependency::success("up"));
        let mut tl = list(vec![up, on_any, on_success]);
        initialize_task_list(&mut tl);

        let ready = update_task_status(&mut tl, "up", TaskStatus::Skipped, None, None);
        assert_eq!(ready, vec!["any".to_string()]);
        assert_eq!(tl.status_of("success"), Some(TaskStatus::Pending));
    }

    #[test]
    fn test_missing_dependency_is_unsatisfied() {
        let t = task("orphan", 1).with_dependency(TaskDependency::any("ghost"));
        let tl = list(vec![t.clone()]);
        assert!(!are_dependencies_satisfied(&t, &tl.tasks));
    }

    #[test]
    fn test_retry_task_respects_limit() {
        let t = task("a", 1).with_metadata(TaskMetadata {
            max_retries: Some(2),
            ..TaskMetadata::default()
        });
        let mut tl = list(vec![t]);

        assert!(retry_task(&mut tl, "a", "boom"));
        assert!(retry_task(&mut tl, "a", "boom"));
        assert!(!retry_task(&mut tl, "a", "boom"));

        let a = tl.get("a").unwrap();
        assert_eq!(a.metadata.retry_count, 2);
        assert_eq!(a.status, TaskStatus::Ready);
        assert_eq!(a.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_skip_task_only_from_pending_or_ready() {
        let a = task("a", 1);
        let b = task("b", 1).with_dependency(TaskDependency::any("a"));
        let mut tl = list(vec![a, b]);
        initialize_task_list(&mut tl);

        assert_eq!(skip_task(&mut tl, "a"), Some(vec!["b".to_string()]));
        assert_eq!(skip_task(&mut tl, "a"), None);
        assert_eq!(skip_task(&mut tl, "missing"), None);
    }

    #[test]
    fn test_statistics_and_completion() {
        let mut tl = list(vec![task("a", 1), task("b", 1), task("c", 1)]);
        initialize_task_list(&mut tl);
        update_task_status(&mut tl, "a", TaskStatus::Completed, None, None);
        update_task_status(&mut tl, "b", TaskStatus::Skipped, None, Some("x".into()));

        let stats = statistics(&tl);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.ready, 1);
        assert!(!is_all_tasks_completed(&tl));
        assert!(!has_failed_tasks(&tl));

        update_task_status(&mut tl, "c", TaskStatus::Completed, None, None);
        assert!(is_all_tasks_completed(&tl));
    }
}
