//! Planner - builds the initial task list for a goal and appends tasks
//! mid-run.
//!
//! Planning never fails from the caller's point of view: any oracle error or
//! unusable plan falls back to a fixed six-task template.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::artifact::{Artifact, ArtifactKind};
use crate::oracle::{generate_as, ContentOracle, GenerationKind, OracleError};
use crate::scheduler::are_dependencies_satisfied;
use crate::task::{
    new_task_id, validate_graph, GraphError, Task, TaskDependency, TaskDraft, TaskId, TaskList,
    TaskMetadata, TaskStatus, TaskType,
};

/// Priority given to planned tasks that do not carry one.
pub const DEFAULT_PLAN_PRIORITY: i32 = 10;
/// Priority given to tasks appended mid-run that do not carry one.
pub const DEFAULT_NEW_TASK_PRIORITY: i32 = 5;

/// What the planner may take into account besides the goal.
#[derive(Debug, Clone, Default)]
pub struct PlanningContext {
    /// Earlier user/assistant turns of the session
    pub history: Vec<String>,
    pub existing_artifacts: Vec<Artifact>,
    pub refinement_prompt: Option<String>,
}

/// Inputs to [`Planner::add_new_tasks`].
#[derive(Debug, Default)]
pub struct AddTasksContext<'a> {
    pub completed_task: Option<&'a Task>,
    /// Explicit tasks to append. When empty the oracle is asked for one.
    pub suggestions: Vec<TaskDraft>,
}

#[derive(Debug, Deserialize)]
struct PlanDraft {
    tasks: Vec<TaskDraft>,
}

#[derive(Debug, thiserror::Error)]
enum PlanError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("plan has no tasks")]
    Empty,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub struct Planner {
    oracle: Option<Arc<dyn ContentOracle>>,
}

impl Planner {
    /// Without an oracle every plan is the fallback template and
    /// `add_new_tasks` only appends explicit suggestions.
    pub fn new(oracle: Option<Arc<dyn ContentOracle>>) -> Self {
        Self { oracle }
    }

    pub async fn plan_tasks(&self, session_id: &str, goal: &str, ctx: &PlanningContext) -> TaskList {
        tracing::info!("Planning tasks for session {}: {}", session_id, goal);

        let Some(oracle) = &self.oracle else {
            return Self::fallback_task_list(session_id, goal);
        };

        match self.plan_with_oracle(oracle.as_ref(), goal, ctx).await {
            Ok(tasks) => {
                tracing::info!("Generated {} tasks for session {}", tasks.len(), session_id);
                TaskList::new(session_id, goal, tasks)
            }
            Err(e) => {
                tracing::warn!("Planning failed for session {}: {}", session_id, e);
                Self::fallback_task_list(session_id, goal)
            }
        }
    }

    async fn plan_with_oracle(
        &self,
        oracle: &dyn ContentOracle,
        goal: &str,
        ctx: &PlanningContext,
    ) -> Result<Vec<Task>, PlanError> {
        let existing: Vec<ArtifactKind> = ctx.existing_artifacts.iter().map(|a| a.kind()).collect();
        let inputs = json!({
            "goal": goal,
            "history": ctx.history,
            "existing_artifacts": existing,
            "refinement_prompt": ctx.refinement_prompt,
        });

        let plan: PlanDraft = generate_as(oracle, GenerationKind::TaskPlan, inputs).await?;
        if plan.tasks.is_empty() {
            return Err(PlanError::Empty);
        }

        let tasks: Vec<Task> = plan
            .tasks
            .into_iter()
            .map(|draft| draft.into_task(DEFAULT_PLAN_PRIORITY))
            .collect();
        validate_graph(&tasks)?;
        Ok(tasks)
    }

    /// analyze → configure → outline → {script, theme} → render.
    pub fn fallback_task_list(session_id: &str, goal: &str) -> TaskList {
        tracing::warn!("Using fallback task list for session {}", session_id);

        let analyze = Task::new(TaskType::Analyze, "Analyze the requirements", DEFAULT_PLAN_PRIORITY)
            .with_parameter("topic", goal)
            .with_metadata(TaskMetadata::planned(30, 3, false));
        let configure = Task::new(TaskType::Configure, "Generate the course configuration", DEFAULT_PLAN_PRIORITY)
            .with_dependency(TaskDependency::success(analyze.id.clone()))
            .with_metadata(TaskMetadata::planned(45, 3, false));
        let outline = Task::new(TaskType::Outline, "Generate the outline", DEFAULT_PLAN_PRIORITY)
            .with_dependency(TaskDependency::success(configure.id.clone()))
            .with_metadata(TaskMetadata::planned(60, 3, false));
        let script = Task::new(TaskType::Script, "Generate the slide scripts", DEFAULT_PLAN_PRIORITY)
            .with_dependency(TaskDependency::success(outline.id.clone()))
            .with_metadata(TaskMetadata::planned(90, 3, false));
        let theme = Task::new(TaskType::Theme, "Generate the presentation theme", DEFAULT_PLAN_PRIORITY)
            .with_dependency(TaskDependency::success(outline.id.clone()))
            .with_metadata(TaskMetadata::planned(45, 3, false));
        let render = Task::new(TaskType::Render, "Render the slides", DEFAULT_PLAN_PRIORITY)
            .with_dependency(TaskDependency::success(script.id.clone()))
            .with_dependency(TaskDependency::success(theme.id.clone()))
            .with_metadata(TaskMetadata::planned(120, 3, true));

        TaskList::new(
            session_id,
            goal,
            vec![analyze, configure, outline, script, theme, render],
        )
    }

    /// Append tasks to a running list and promote the ones whose
    /// dependencies are already satisfied.
    ///
    /// Returns the ids of the appended tasks. Drafts that depend on ids not in
    /// the list are dropped.
    pub async fn add_new_tasks(
        &self,
        task_list: &mut TaskList,
        reason: &str,
        ctx: AddTasksContext<'_>,
    ) -> Vec<TaskId> {
        tracing::info!(
            "Adding new tasks to session {}. Reason: {}",
            task_list.session_id,
            reason
        );

        let drafts = if !ctx.suggestions.is_empty() {
            ctx.suggestions
        } else {
            match self.suggest_task(task_list, reason, ctx.completed_task).await {
                Some(draft) => vec![draft],
                None => return Vec::new(),
            }
        };

        let mut added = Vec::new();
        for draft in drafts {
            let mut task = draft.into_task(DEFAULT_NEW_TASK_PRIORITY);
            if task_list.contains(&task.id) {
                task.id = new_task_id();
            }

            if let Some(dep) = task
                .dependencies
                .iter()
                .find(|d| !task_list.contains(&d.task_id))
            {
                tracing::warn!(
                    "Dropping {} task: depends on unknown task {}",
                    task.task_type,
                    dep.task_id
                );
                continue;
            }

            if are_dependencies_satisfied(&task, &task_list.tasks) {
                task.set_status(TaskStatus::Ready);
            }
            tracing::info!(
                "Added new task {} of type {} ({})",
                task.id,
                task.task_type,
                task.status
            );
            added.push(task.id.clone());
            task_list.tasks.push(task);
        }

        task_list.touch();
        added
    }

    async fn suggest_task(
        &self,
        task_list: &TaskList,
        reason: &str,
        completed_task: Option<&Task>,
    ) -> Option<TaskDraft> {
        let Some(oracle) = &self.oracle else {
            tracing::warn!("No oracle configured, skipping dynamic task generation");
            return None;
        };

        let tasks: Vec<Value> = task_list
            .tasks
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "type": t.task_type,
                    "description": t.description,
                    "status": t.status,
                })
            })
            .collect();
        let inputs = json!({
            "goal": task_list.topic,
            "tasks": tasks,
            "completed_task": completed_task.map(|t| json!({
                "id": t.id,
                "type": t.task_type,
                "description": t.description,
            })),
            "reason": reason,
        });

        match generate_as::<TaskDraft>(oracle.as_ref(), GenerationKind::TaskSuggestion, inputs).await {
            Ok(mut draft) => {
                // Ids are always assigned here.
                draft.id = None;
                Some(draft)
            }
            Err(e) => {
                tracing::error!("Error adding new tasks: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{topological_order, DependencyCondition};
    use async_trait::async_trait;

    struct FixedOracle(Result<Value, String>);

    #[async_trait]
    impl ContentOracle for FixedOracle {
        async fn generate(&self, _kind: GenerationKind, _inputs: Value) -> Result<Value, OracleError> {
            self.0.clone().map_err(OracleError::Request)
        }
    }

    fn planner(reply: Result<Value, String>) -> Planner {
        Planner::new(Some(Arc::new(FixedOracle(reply))))
    }

    fn types(list: &TaskList) -> Vec<TaskType> {
        list.tasks.iter().map(|t| t.task_type).collect()
    }

    const TEMPLATE: [TaskType; 6] = [
        TaskType::Analyze,
        TaskType::Configure,
        TaskType::Outline,
        TaskType::Script,
        TaskType::Theme,
        TaskType::Render,
    ];

    #[test]
    fn test_fallback_template_shape() {
        let list = Planner::fallback_task_list("s1", "Rust traits");
        assert_eq!(types(&list), TEMPLATE);
        assert_eq!(list.session_id, "s1");
        assert_eq!(list.tasks[0].parameter_str("topic"), Some("Rust traits"));

        let render = &list.tasks[5];
        assert!(render.is_critical());
        assert!(render.depends_on(&list.tasks[3].id));
        assert!(render.depends_on(&list.tasks[4].id));
        assert!(list.tasks[..5].iter().all(|t| !t.is_critical()));
        assert!(list
            .tasks
            .iter()
            .flat_map(|t| &t.dependencies)
            .all(|d| d.condition == DependencyCondition::Success));
        assert!(list.tasks.iter().all(|t| t.priority == 10 && t.metadata.retry_limit() == 3));
        assert_eq!(topological_order(&list.tasks).unwrap().len(), 6);

        // Every task hangs off the analyze root through success edges.
        let mut reached = vec![list.tasks[0].id.clone()];
        let mut grew = true;
        while grew {
            grew = false;
            for task in &list.tasks {
                if reached.contains(&task.id) {
                    continue;
                }
                let linked = task.dependencies.iter().any(|d| {
                    d.condition == DependencyCondition::Success && reached.contains(&d.task_id)
                });
                if linked {
                    reached.push(task.id.clone());
                    grew = true;
                }
            }
        }
        assert_eq!(reached.len(), list.tasks.len());
    }

    #[tokio::test]
    async fn test_without_oracle_uses_template() {
        let list = Planner::new(None)
            .plan_tasks("s1", "goal", &PlanningContext::default())
            .await;
        assert_eq!(types(&list), TEMPLATE);
    }

    #[tokio::test]
    async fn test_oracle_plan_is_normalized() {
        let reply = json!({"tasks": [
            {"id": "a", "type": "analyze_topic", "description": "analyze"},
            {"id": "b", "type": "search", "priority": 4,
             "dependencies": [{"task_id": "a"}]},
            {"type": "generate_course_config", "dependencies": [{"task_id": "b", "condition": "any"}]}
        ]});
        let list = planner(Ok(reply))
            .plan_tasks("s1", "goal", &PlanningContext::default())
            .await;

        assert_eq!(types(&list), [TaskType::Analyze, TaskType::Search, TaskType::Configure]);
        assert_eq!(list.tasks[0].priority, DEFAULT_PLAN_PRIORITY);
        assert_eq!(list.tasks[1].priority, 4);
        assert!(list.tasks[2].id.starts_with("task_"));
        assert_eq!(list.tasks[1].dependencies[0].condition, DependencyCondition::All);
        assert!(list.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert!(list.id.starts_with("tasklist_"));
    }

    #[tokio::test]
    async fn test_planned_tasks_start_with_no_retries_used() {
        let reply = json!({"tasks": [
            {"id": "a", "type": "analyze", "metadata": {"retry_count": 7, "can_retry": true}},
            {"id": "b", "type": "render", "dependencies": [{"task_id": "a"}],
             "metadata": {"retry_count": 2, "can_retry": true, "max_retries": 2}}
        ]});
        let mut list = planner(Ok(reply))
            .plan_tasks("s1", "goal", &PlanningContext::default())
            .await;

        assert_eq!(types(&list), [TaskType::Analyze, TaskType::Render]);
        for task in &list.tasks {
            assert_eq!(task.metadata.retry_count, 0);
            assert!(task.metadata.has_retries_left());
        }
        assert_eq!(list.tasks[1].metadata.retry_limit(), 2);

        list.tasks[0].status = TaskStatus::Completed;
        let mut draft = TaskDraft::new(TaskType::Search, "more sources");
        draft.metadata.retry_count = 5;
        let added = Planner::new(None)
            .add_new_tasks(
                &mut list,
                "supplementary research",
                AddTasksContext {
                    completed_task: None,
                    suggestions: vec![draft],
                },
            )
            .await;
        assert_eq!(added.len(), 1);
        let search = list.get(&added[0]).unwrap();
        assert_eq!(search.metadata.retry_count, 0);
    }

    #[tokio::test]
    async fn test_oracle_failures_fall_back() {
        let cyclic = json!({"tasks": [
            {"id": "a", "type": "analyze", "dependencies": [{"task_id": "b"}]},
            {"id": "b", "type": "configure", "dependencies": [{"task_id": "a"}]}
        ]});
        let unknown_dep = json!({"tasks": [
            {"id": "a", "type": "analyze", "dependencies": [{"task_id": "ghost"}]}
        ]});
        for reply in [
            Err("timeout".to_string()),
            Ok(json!({"tasks": []})),
            Ok(json!({"nonsense": 1})),
            Ok(cyclic),
            Ok(unknown_dep),
        ] {
            let list = planner(reply)
                .plan_tasks("s1", "goal", &PlanningContext::default())
                .await;
            assert_eq!(types(&list), TEMPLATE);
        }
    }

    #[tokio::test]
    async fn test_suggestion_on_completed_task_is_ready_immediately() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        list.tasks[1].status = TaskStatus::Completed;
        let configure_id = list.tasks[1].id.clone();

        let draft = TaskDraft::new(TaskType::Search, "search for the audience")
            .with_dependency(TaskDependency::success(configure_id));
        let added = Planner::new(None)
            .add_new_tasks(
                &mut list,
                "supplementary research",
                AddTasksContext {
                    completed_task: None,
                    suggestions: vec![draft],
                },
            )
            .await;

        assert_eq!(added.len(), 1);
        let task = list.get(&added[0]).unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.priority, DEFAULT_NEW_TASK_PRIORITY);
        assert_eq!(list.tasks.len(), 7);
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_dropped() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        let draft = TaskDraft::new(TaskType::Search, "search")
            .with_dependency(TaskDependency::success("ghost"));
        let pending = TaskDraft::new(TaskType::Validate, "validate")
            .with_dependency(TaskDependency::success(list.tasks[5].id.clone()));

        let added = Planner::new(None)
            .add_new_tasks(
                &mut list,
                "reason",
                AddTasksContext {
                    completed_task: None,
                    suggestions: vec![draft, pending],
                },
            )
            .await;
        assert_eq!(added.len(), 1);
        assert_eq!(list.get(&added[0]).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_dynamic_synthesis_uses_oracle() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        let reply = json!({"id": "forced", "type": "search", "description": "more research"});
        let added = planner(Ok(reply))
            .add_new_tasks(&mut list, "need more material", AddTasksContext::default())
            .await;

        assert_eq!(added.len(), 1);
        assert_ne!(added[0], "forced");
        assert_eq!(list.get(&added[0]).unwrap().status, TaskStatus::Ready);

        let added = planner(Err("down".to_string()))
            .add_new_tasks(&mut list, "again", AddTasksContext::default())
            .await;
        assert!(added.is_empty());
        let added = Planner::new(None)
            .add_new_tasks(&mut list, "again", AddTasksContext::default())
            .await;
        assert!(added.is_empty());
        assert_eq!(list.tasks.len(), 7);
    }
}
