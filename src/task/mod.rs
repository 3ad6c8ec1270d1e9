//! Task module - defines tasks, their dependencies and the task list that
//! a single run mutates.
//!
//! The types here carry no behavior beyond local invariants:
//! - Status transitions are driven by the scheduler and the control loop
//! - Structural checks over a whole list live in [`graph`]
//! - Everything serializes so a list can be checkpointed and resumed

pub mod task;
mod list;
pub mod graph;

pub use task::{
    DependencyCondition, Task, TaskDependency, TaskDraft, TaskId, TaskMetadata, TaskStatus,
    TaskType, DEFAULT_MAX_RETRIES, new_task_id,
};
pub use list::{TaskList, TaskListStatus};
pub use graph::{validate_graph, topological_order, GraphError};
