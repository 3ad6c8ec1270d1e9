//! Reflector - looks at a just-finished task and decides whether the run
//! should grow, continue or stop.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::artifact::{Artifact, ArtifactContent, QualityCheckResult};
use crate::oracle::{generate_as, ContentOracle, GenerationKind, OracleError};
use crate::scheduler::is_all_tasks_completed;
use crate::task::{Task, TaskDependency, TaskDraft, TaskList, TaskMetadata, TaskStatus, TaskType};

const REFINE_PRIORITY: i32 = 8;
const SEARCH_PRIORITY: i32 = 5;
const VALIDATE_PRIORITY: i32 = 3;
/// Outlines with more knowledge units than this get a complexity check.
const OUTLINE_UNITS_BEFORE_VALIDATION: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ReflectionResult {
    pub needs_new_tasks: bool,
    pub should_continue: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_task_suggestions: Vec<TaskDraft>,
}

impl ReflectionResult {
    fn stop(reason: impl Into<String>) -> Self {
        Self {
            needs_new_tasks: false,
            should_continue: false,
            reason: reason.into(),
            new_task_suggestions: Vec::new(),
        }
    }

    fn proceed(reason: impl Into<String>) -> Self {
        Self {
            should_continue: true,
            ..Self::stop(reason)
        }
    }

    fn extend(reason: impl Into<String>, suggestions: Vec<TaskDraft>) -> Self {
        Self {
            needs_new_tasks: true,
            should_continue: true,
            reason: reason.into(),
            new_task_suggestions: suggestions,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    /// When false the oracle is never asked for a quality verdict.
    pub quality_checks: bool,
    /// Refine tasks that may target one original task
    pub max_refinements_per_task: u32,
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            quality_checks: true,
            max_refinements_per_task: 1,
        }
    }
}

pub struct Reflector {
    oracle: Option<Arc<dyn ContentOracle>>,
    config: ReflectorConfig,
}

impl Reflector {
    pub fn new(oracle: Option<Arc<dyn ContentOracle>>, config: ReflectorConfig) -> Self {
        Self { oracle, config }
    }

    pub async fn reflect(
        &self,
        task_list: &TaskList,
        completed_task: &Task,
        artifacts: &[Artifact],
    ) -> ReflectionResult {
        tracing::info!(
            "Reflecting on task {} of type {}",
            completed_task.id,
            completed_task.task_type
        );

        if completed_task.status != TaskStatus::Completed {
            return ReflectionResult::stop("task failed");
        }

        let quality = match self.check_quality(task_list, completed_task, artifacts).await {
            Ok(quality) => quality,
            Err(e) => {
                tracing::error!("Error checking result quality of {}: {}", completed_task.id, e);
                return ReflectionResult::stop(format!("reflection failed: {}", e));
            }
        };
        tracing::info!(
            "Quality check result: score={}, needs_refinement={}",
            quality.score,
            quality.needs_refinement
        );

        if quality.needs_refinement && !quality.issues.is_empty() {
            if let Some(refine) = self.refinement(task_list, completed_task, &quality.issues) {
                return ReflectionResult::extend(
                    format!("Result quality needs improvement: {}", quality.issues.join(", ")),
                    vec![refine],
                );
            }
        }

        let additional = suggest_additional_tasks(completed_task, &task_list.topic);
        if !additional.is_empty() {
            return ReflectionResult::extend(
                "Additional tasks needed based on current result",
                additional,
            );
        }

        if is_all_tasks_completed(task_list) {
            return ReflectionResult::stop("all tasks completed");
        }

        ReflectionResult::proceed("continue with remaining tasks")
    }

    async fn check_quality(
        &self,
        task_list: &TaskList,
        task: &Task,
        artifacts: &[Artifact],
    ) -> Result<QualityCheckResult, OracleError> {
        let oracle = match &self.oracle {
            Some(oracle) if self.config.quality_checks => oracle,
            _ => return Ok(QualityCheckResult::assumed_good()),
        };

        let inputs = json!({
            "goal": task_list.topic,
            "task_type": task.task_type,
            "task_description": task.description,
            "result": task.result.as_ref().map(|r| &r.artifact.content),
            "available_artifacts": artifacts.iter().map(|a| a.kind()).collect::<Vec<_>>(),
        });
        let check: QualityCheckResult =
            generate_as(oracle.as_ref(), GenerationKind::QualityCheck, inputs).await?;
        Ok(check.normalized())
    }

    /// A refine suggestion for the task behind `completed`, if its type is
    /// refinable and its refinement budget is not spent.
    fn refinement(&self, task_list: &TaskList, completed: &Task, issues: &[String]) -> Option<TaskDraft> {
        let target = match completed.task_type {
            TaskType::Refine => completed
                .result
                .as_ref()
                .and_then(|r| r.refined_task_id.as_deref())
                .and_then(|id| task_list.get(id))?,
            _ => completed,
        };

        if !target.task_type.is_refinable() {
            tracing::debug!("Task type {} cannot be refined", target.task_type);
            return None;
        }

        let spent = task_list
            .tasks
            .iter()
            .filter(|t| {
                t.task_type == TaskType::Refine
                    && crate::executor::refine_target_id(t) == Some(target.id.as_str())
            })
            .count();
        if spent >= self.config.max_refinements_per_task as usize {
            tracing::info!(
                "Refinement budget of task {} spent ({}), accepting result",
                target.id,
                spent
            );
            return None;
        }

        Some(
            TaskDraft::new(TaskType::Refine, format!("Refine the result of {}", target.task_type))
                .with_parameter("task_id", target.id.clone())
                .with_parameter("issues", json!(issues))
                .with_dependency(TaskDependency::success(completed.id.clone()))
                .with_priority(REFINE_PRIORITY)
                .with_metadata(TaskMetadata::planned(30, 2, false)),
        )
    }
}

/// Type-specific follow-ups.
fn suggest_additional_tasks(completed: &Task, topic: &str) -> Vec<TaskDraft> {
    let Some(content) = completed.result.as_ref().map(|r| &r.artifact.content) else {
        return Vec::new();
    };
    let after_completed = TaskDependency::success(completed.id.clone());

    match (completed.task_type, content) {
        (TaskType::Configure, ArtifactContent::CourseConfig(config))
            if !config.target_audience.trim().is_empty() =>
        {
            let audience = config.target_audience.trim();
            vec![TaskDraft::new(
                TaskType::Search,
                format!("Search for material about \"{}\"", audience),
            )
            .with_parameter("query", format!("{} teaching methods best practices", audience))
            .with_dependency(after_completed)
            .with_priority(SEARCH_PRIORITY)
            .with_metadata(TaskMetadata::planned(20, 3, false))]
        }
        (TaskType::Outline, ArtifactContent::Outline(outline))
            if outline.knowledge_units.len() > OUTLINE_UNITS_BEFORE_VALIDATION =>
        {
            vec![TaskDraft::new(TaskType::Validate, "Check that the outline complexity is appropriate")
                .with_parameter("task_id", completed.id.clone())
                .with_parameter("criteria", "complexity")
                .with_dependency(after_completed)
                .with_priority(VALIDATE_PRIORITY)
                .with_metadata(TaskMetadata {
                    estimated_duration: Some(15),
                    can_retry: Some(false),
                    max_retries: Some(1),
                    critical: Some(false),
                    ..TaskMetadata::default()
                })]
        }
        (TaskType::Search, ArtifactContent::SearchResult(results))
            if results.hits.is_empty() && !is_broadened(completed) =>
        {
            vec![TaskDraft::new(TaskType::Search, "Search again with broader keywords")
                .with_parameter("query", format!("{} overview", topic))
                .with_parameter("broadened", true)
                .with_dependency(after_completed)
                .with_priority(SEARCH_PRIORITY)
                .with_metadata(TaskMetadata::planned(20, 3, false))]
        }
        _ => Vec::new(),
    }
}

fn is_broadened(task: &Task) -> bool {
    task.parameters
        .get("broadened")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{CourseConfig, KnowledgeUnit, SearchResults, VideoOutline};
    use crate::executor::TaskOutput;
    use crate::planner::Planner;
    use async_trait::async_trait;
    use serde_json::Value;

    struct VerdictOracle(Result<Value, String>);

    #[async_trait]
    impl ContentOracle for VerdictOracle {
        async fn generate(&self, kind: GenerationKind, _inputs: Value) -> Result<Value, OracleError> {
            assert_eq!(kind, GenerationKind::QualityCheck);
            self.0.clone().map_err(OracleError::Request)
        }
    }

    fn needs_refinement() -> Value {
        json!({
            "is_complete": true, "meets_expectations": false, "has_errors": false,
            "issues": ["audience too broad"], "score": 55, "needs_refinement": true
        })
    }

    fn reflector(verdict: Option<Result<Value, String>>) -> Reflector {
        let oracle = verdict.map(|v| Arc::new(VerdictOracle(v)) as Arc<dyn ContentOracle>);
        Reflector::new(oracle, ReflectorConfig::default())
    }

    fn complete(task: &mut Task, content: ArtifactContent) {
        task.status = TaskStatus::Completed;
        task.result = Some(TaskOutput {
            artifact: Artifact::new(format!("art_{}", task.id), content, 1),
            refined_task_id: None,
        });
    }

    fn config(audience: &str) -> ArtifactContent {
        ArtifactContent::CourseConfig(CourseConfig {
            narrative_style: "formal".to_string(),
            target_audience: audience.to_string(),
            duration: String::new(),
            objectives: vec![],
            expected_page_count: 5,
        })
    }

    fn outline(units: usize) -> ArtifactContent {
        ArtifactContent::Outline(VideoOutline {
            theme: "t".to_string(),
            knowledge_units: (0..units)
                .map(|i| KnowledgeUnit {
                    title: format!("unit {}", i),
                    description: String::new(),
                    knowledge_points: vec![],
                })
                .collect(),
        })
    }

    fn no_hits() -> ArtifactContent {
        ArtifactContent::SearchResult(SearchResults {
            query: "q".to_string(),
            hits: vec![],
        })
    }

    #[tokio::test]
    async fn test_unfinished_task_stops() {
        let list = Planner::fallback_task_list("s1", "goal");
        let mut task = list.tasks[0].clone();
        task.status = TaskStatus::Skipped;

        let result = reflector(None).reflect(&list, &task, &[]).await;
        assert!(!result.should_continue);
        assert!(!result.needs_new_tasks);
    }

    #[tokio::test]
    async fn test_continue_and_all_completed() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        let mut task = list.tasks[0].clone();
        complete(&mut task, outline(1));
        let result = reflector(None).reflect(&list, &task, &[]).await;
        assert!(result.should_continue);
        assert!(!result.needs_new_tasks);

        for t in list.tasks.iter_mut() {
            t.status = TaskStatus::Completed;
        }
        let result = reflector(None).reflect(&list, &task, &[]).await;
        assert!(!result.should_continue);
        assert_eq!(result.reason, "all tasks completed");
    }

    #[tokio::test]
    async fn test_refinement_suggested_once_per_task() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        complete(&mut list.tasks[1], config(""));
        let configure = list.tasks[1].clone();
        let reflector = reflector(Some(Ok(needs_refinement())));

        let result = reflector.reflect(&list, &configure, &[]).await;
        assert!(result.needs_new_tasks && result.should_continue);
        let refine = &result.new_task_suggestions[0];
        assert_eq!(refine.task_type, TaskType::Refine);
        assert_eq!(refine.priority, Some(REFINE_PRIORITY));
        assert_eq!(refine.metadata.max_retries, Some(2));
        assert_eq!(refine.parameters["task_id"], json!(configure.id));
        assert_eq!(refine.parameters["issues"], json!(["audience too broad"]));
        assert_eq!(refine.dependencies[0].task_id, configure.id);

        // once a refine task exists for it, the result is accepted
        list.tasks.push(refine.clone().into_task(5));
        let result = reflector.reflect(&list, &configure, &[]).await;
        assert!(!result.needs_new_tasks);
    }

    #[tokio::test]
    async fn test_render_is_never_refined() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        list.tasks[5].status = TaskStatus::Completed;
        list.tasks[5].result = None;
        let render = list.tasks[5].clone();

        let result = reflector(Some(Ok(needs_refinement())))
            .reflect(&list, &render, &[])
            .await;
        assert!(!result.needs_new_tasks);
    }

    #[tokio::test]
    async fn test_oracle_error_stops_without_new_tasks() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        complete(&mut list.tasks[1], config("students"));
        let configure = list.tasks[1].clone();

        let result = reflector(Some(Err("timeout".to_string())))
            .reflect(&list, &configure, &[])
            .await;
        assert!(!result.should_continue);
        assert!(!result.needs_new_tasks);
        assert!(result.reason.starts_with("reflection failed"));
    }

    #[tokio::test]
    async fn test_configure_suggests_audience_search() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        complete(&mut list.tasks[1], config("data engineers"));
        let configure = list.tasks[1].clone();

        let result = reflector(None).reflect(&list, &configure, &[]).await;
        assert!(result.needs_new_tasks);
        let search = &result.new_task_suggestions[0];
        assert_eq!(search.task_type, TaskType::Search);
        assert_eq!(search.priority, Some(SEARCH_PRIORITY));
        assert!(search.parameters["query"].as_str().unwrap().starts_with("data engineers"));
        assert_eq!(search.dependencies, vec![TaskDependency::success(configure.id.clone())]);
    }

    #[tokio::test]
    async fn test_large_outline_suggests_validation() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        complete(&mut list.tasks[2], outline(3));
        let small = list.tasks[2].clone();
        assert!(!reflector(None).reflect(&list, &small, &[]).await.needs_new_tasks);

        complete(&mut list.tasks[2], outline(4));
        let large = list.tasks[2].clone();
        let result = reflector(None).reflect(&list, &large, &[]).await;
        let validate = &result.new_task_suggestions[0];
        assert_eq!(validate.task_type, TaskType::Validate);
        assert_eq!(validate.priority, Some(VALIDATE_PRIORITY));
        assert_eq!(validate.metadata.retry_limit(), 0);
    }

    #[tokio::test]
    async fn test_empty_search_broadened_once() {
        let list = Planner::fallback_task_list("s1", "Rust macros");
        let mut search = Task::new(TaskType::Search, "search", 5);
        complete(&mut search, no_hits());

        let result = reflector(None).reflect(&list, &search, &[]).await;
        let broader = &result.new_task_suggestions[0];
        assert_eq!(broader.parameters["query"], "Rust macros overview");
        assert_eq!(broader.parameters["broadened"], true);

        let mut second = broader.clone().into_task(5);
        complete(&mut second, no_hits());
        let result = reflector(None).reflect(&list, &second, &[]).await;
        assert!(!result.needs_new_tasks);
    }

    #[tokio::test]
    async fn test_quality_checks_disabled_assumes_good() {
        let mut list = Planner::fallback_task_list("s1", "goal");
        complete(&mut list.tasks[2], outline(1));
        let task = list.tasks[2].clone();
        let reflector = Reflector::new(
            Some(Arc::new(VerdictOracle(Err("must not be called".to_string())))),
            ReflectorConfig {
                quality_checks: false,
                ..ReflectorConfig::default()
            },
        );
        let result = reflector.reflect(&list, &task, &[]).await;
        assert!(result.should_continue);
    }
}
