//! Structural checks over a task list: unique ids, known dependencies and
//! acyclicity.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use super::task::{Task, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate task id: {0}")]
    DuplicateId(TaskId),

    #[error("Task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Cycle detected in dependency graph: {0:?}")]
    Cycle(Vec<TaskId>),
}

/// Check that ids are unique, every dependency resolves and there is no cycle.
pub fn validate_graph(tasks: &[Task]) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(GraphError::DuplicateId(task.id.clone()));
        }
    }

    for task in tasks {
        for dep in &task.dependencies {
            if !seen.contains(dep.task_id.as_str()) {
                return Err(GraphError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.task_id.clone(),
                });
            }
        }
    }

    topological_order(tasks).map(|_| ())
}

/// Kahn's algorithm. Ties are resolved in insertion order so the result is
/// deterministic.
///
/// Dependencies on unknown ids are ignored here; [`validate_graph`] reports them.
pub fn topological_order(tasks: &[Task]) -> Result<Vec<TaskId>, GraphError> {
    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            if let Some(&upstream) = index.get(dep.task_id.as_str()) {
                in_degree[i] += 1;
                dependents[upstream].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(i) = queue.pop_front() {
        order.push(tasks[i].id.clone());
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                queue.push_back(d);
            }
        }
    }

    if order.len() != tasks.len() {
        let stuck = tasks
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, t)| t.id.clone())
            .collect();
        return Err(GraphError::Cycle(stuck));
    }

    Ok(order)
}
