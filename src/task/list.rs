//! The mutable task graph for one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskStatus};

/// Lifecycle of a whole task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskListStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

impl TaskListStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskListStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Ordered, append-only collection of tasks for one session.
///
/// Insertion order is meaningful: it breaks priority ties in the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,
    pub session_id: String,
    pub topic: String,
    pub tasks: Vec<Task>,
    pub status: TaskListStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskList {
    pub fn new(session_id: impl Into<String>, topic: impl Into<String>, tasks: Vec<Task>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("tasklist_{}", uuid::Uuid::new_v4()),
            session_id: session_id.into(),
            topic: topic.into(),
            tasks,
            status: TaskListStatus::Planning,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.get(task_id).is_some()
    }

    /// Current status of a task, if it exists.
    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.get(task_id).map(|t| t.status)
    }

    /// Whether any task still has work ahead of it.
    pub fn has_active_tasks(&self) -> bool {
        self.tasks.iter().any(|t| t.status.is_active())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
