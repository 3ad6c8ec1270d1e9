//! Built-in task handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{refine_target_id, ExecutionContext, ExecutionError, TaskHandler};
use crate::artifact::{
    ArtifactContent, ArtifactKind, CourseConfig, PptHtmlDocument, PresentationTheme,
    QualityCheckResult, RequirementAnalysis, ScriptSet, SearchResults, SlideContent, SlideHtml,
    SlideScript, VideoOutline,
};
use crate::events::{EventSink, ProgressEvent};
use crate::oracle::{generate_as, ContentOracle, GenerationKind, OracleError};
use crate::search::SearchProvider;
use crate::task::{Task, TaskType};

const DEFAULT_MAX_SEARCH_RESULTS: usize = 5;

/// Oracle-generated deck content: analyze, configure, outline, script, theme.
pub struct ContentHandler {
    task_type: TaskType,
    oracle: Arc<dyn ContentOracle>,
}

impl ContentHandler {
    pub fn new(task_type: TaskType, oracle: Arc<dyn ContentOracle>) -> Self {
        Self { task_type, oracle }
    }

    fn inputs(&self, task: &Task, ctx: &ExecutionContext<'_>) -> Result<Value, ExecutionError> {
        let mut inputs = Map::new();
        inputs.insert("goal".to_string(), json!(ctx.topic));
        if !task.parameters.is_empty() {
            inputs.insert("parameters".to_string(), Value::Object(task.parameters.clone()));
        }
        if let Some(prompt) = &ctx.refinement_prompt {
            inputs.insert("refinement_prompt".to_string(), json!(prompt));
        }

        match self.task_type {
            TaskType::Analyze => {}
            TaskType::Configure => {
                let analysis = ctx.require(ArtifactKind::Analysis, ArtifactContent::as_analysis)?;
                inputs.insert("analysis".to_string(), to_json(analysis)?);
            }
            TaskType::Outline => {
                let config = ctx.require(ArtifactKind::CourseConfig, ArtifactContent::as_course_config)?;
                inputs.insert("course_config".to_string(), to_json(config)?);
                if let Some(research) = ctx.optional(ArtifactContent::as_search_results) {
                    inputs.insert("research".to_string(), to_json(research)?);
                }
            }
            TaskType::Script | TaskType::Theme => {
                let outline = ctx.require(ArtifactKind::Outline, ArtifactContent::as_outline)?;
                let config = ctx.require(ArtifactKind::CourseConfig, ArtifactContent::as_course_config)?;
                inputs.insert("outline".to_string(), to_json(outline)?);
                inputs.insert("course_config".to_string(), to_json(config)?);
            }
            other => return Err(ExecutionError::UnknownTaskType(other)),
        }
        Ok(Value::Object(inputs))
    }
}

#[async_trait]
impl TaskHandler for ContentHandler {
    fn task_type(&self) -> TaskType {
        self.task_type
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ArtifactContent, ExecutionError> {
        let inputs = self.inputs(task, ctx)?;
        let oracle = self.oracle.as_ref();

        let content = match self.task_type {
            TaskType::Analyze => ArtifactContent::Analysis(
                generate_as::<RequirementAnalysis>(oracle, GenerationKind::Analysis, inputs).await?,
            ),
            TaskType::Configure => ArtifactContent::CourseConfig(
                generate_as::<CourseConfig>(oracle, GenerationKind::CourseConfig, inputs).await?,
            ),
            TaskType::Outline => ArtifactContent::Outline(
                generate_as::<VideoOutline>(oracle, GenerationKind::Outline, inputs).await?,
            ),
            TaskType::Script => {
                // Bare arrays of scripts are accepted as well as {"scripts": [...]}.
                let value = oracle.generate(GenerationKind::SlideScripts, inputs).await?;
                let value = match value {
                    Value::Array(scripts) => json!({ "scripts": scripts }),
                    other => other,
                };
                let mut set: ScriptSet = serde_json::from_value(value).map_err(|e| {
                    OracleError::Malformed {
                        kind: GenerationKind::SlideScripts,
                        message: e.to_string(),
                    }
                })?;
                if set.scripts.is_empty() {
                    return Err(ExecutionError::InvalidInput(
                        "oracle produced no slide scripts".to_string(),
                    ));
                }
                set.scripts.sort_by_key(|s| s.slide_index);
                ArtifactContent::ScriptSet(set)
            }
            TaskType::Theme => ArtifactContent::Theme(
                generate_as::<PresentationTheme>(oracle, GenerationKind::Theme, inputs).await?,
            ),
            other => return Err(ExecutionError::UnknownTaskType(other)),
        };
        Ok(content)
    }
}

/// Renders one page per slide script and assembles the document.
pub struct RenderHandler {
    oracle: Arc<dyn ContentOracle>,
    events: Arc<dyn EventSink>,
}

impl RenderHandler {
    pub fn new(oracle: Arc<dyn ContentOracle>, events: Arc<dyn EventSink>) -> Self {
        Self { oracle, events }
    }
}

#[async_trait]
impl TaskHandler for RenderHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Render
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ArtifactContent, ExecutionError> {
        let scripts = &ctx
            .require(ArtifactKind::ScriptSet, ArtifactContent::as_script_set)?
            .scripts;
        let theme = ctx.require(ArtifactKind::Theme, ArtifactContent::as_theme)?;
        let config = ctx.optional(ArtifactContent::as_course_config);
        let outline = ctx.optional(ArtifactContent::as_outline);

        if scripts.is_empty() {
            return Err(ExecutionError::InvalidInput("no slide scripts to render".to_string()));
        }

        let course_title = outline
            .map(|o| o.theme.as_str())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(ctx.topic);
        let total = scripts.len();
        let mut pages = Vec::with_capacity(total);

        for (i, script) in scripts.iter().enumerate() {
            let inputs = page_inputs(script, theme, course_title, total, ctx.refinement_prompt.as_deref());
            let mut page: SlideHtml =
                generate_as(self.oracle.as_ref(), GenerationKind::SlidePage, inputs).await?;
            page.slide_index = script.slide_index;
            pages.push(page);

            tracing::debug!("Rendered page {}/{} for task {}", i + 1, total, task.id);
            self.events.emit(ProgressEvent::PageProgress {
                session_id: ctx.session_id.to_string(),
                task_id: task.id.clone(),
                completed: i + 1,
                total,
            });
        }

        Ok(ArtifactContent::PageHtml(PptHtmlDocument {
            title: document_title(config, scripts, outline, ctx.topic),
            pages,
        }))
    }
}

fn page_inputs(
    script: &SlideScript,
    theme: &PresentationTheme,
    course_title: &str,
    total: usize,
    refinement_prompt: Option<&str>,
) -> Value {
    let content = match &script.content {
        SlideContent::Text(text) => text.clone(),
        SlideContent::Bullets(items) => items.join("; "),
    };
    json!({
        "slide_index": script.slide_index,
        "page_count": total,
        "type": script.kind,
        "title": script.title,
        "content": content,
        "visual_suggestions": script.visual_suggestions,
        "narration_script": script.narration_script,
        "design_style": theme.theme_name,
        "primary_color": theme.color_scheme.primary,
        "secondary_color": theme.color_scheme.secondary,
        "background_color": theme.color_scheme.background,
        "text_color": theme.color_scheme.text,
        "title_font": theme.font_config.title_font,
        "body_font": theme.font_config.body_font,
        "course_title": course_title,
        "refinement_prompt": refinement_prompt,
    })
}

/// `"{audience} - {first slide design}"`, else the outline theme, else the goal.
fn document_title(
    config: Option<&CourseConfig>,
    scripts: &[SlideScript],
    outline: Option<&VideoOutline>,
    topic: &str,
) -> String {
    let design = scripts
        .first()
        .map(|s| s.content_design.trim())
        .filter(|d| !d.is_empty());
    if let (Some(config), Some(design)) = (config, design) {
        return format!("{} - {}", config.target_audience, design);
    }
    outline
        .map(|o| o.theme.trim())
        .filter(|t| !t.is_empty())
        .unwrap_or(topic)
        .to_string()
}

/// Web search; the query defaults to the goal.
pub struct SearchHandler {
    search: Arc<dyn SearchProvider>,
}

impl SearchHandler {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl TaskHandler for SearchHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Search
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ArtifactContent, ExecutionError> {
        let query = task
            .parameter_str("query")
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(ctx.topic)
            .to_string();
        let max_results = task
            .parameters
            .get("max_results")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_MAX_SEARCH_RESULTS);

        let hits = self.search.search(&query, max_results).await?;
        tracing::info!("Search '{}' found {} results", query, hits.len());
        Ok(ArtifactContent::SearchResult(SearchResults { query, hits }))
    }
}

/// Quality check over the artifact another task produced.
pub struct ValidateHandler {
    oracle: Arc<dyn ContentOracle>,
}

impl ValidateHandler {
    pub fn new(oracle: Arc<dyn ContentOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl TaskHandler for ValidateHandler {
    fn task_type(&self) -> TaskType {
        TaskType::Validate
    }

    async fn handle(
        &self,
        task: &Task,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ArtifactContent, ExecutionError> {
        let target_id = refine_target_id(task)
            .ok_or_else(|| ExecutionError::InvalidInput("validate task has no task_id".to_string()))?;
        let target = ctx
            .task_list
            .get(target_id)
            .ok_or_else(|| ExecutionError::TargetMissing(target_id.to_string()))?;
        let output = target
            .result
            .as_ref()
            .ok_or_else(|| ExecutionError::TargetHasNoResult(target_id.to_string()))?;

        let inputs = json!({
            "goal": ctx.topic,
            "task_type": target.task_type,
            "task_description": target.description,
            "result": output.artifact.content,
        });
        let check: QualityCheckResult =
            generate_as(self.oracle.as_ref(), GenerationKind::QualityCheck, inputs).await?;
        Ok(ArtifactContent::Validation(check.normalized()))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ExecutionError> {
    serde_json::to_value(value).map_err(|e| ExecutionError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::SlideKind;

    fn script(index: u32, design: &str) -> SlideScript {
        SlideScript {
            slide_index: index,
            kind: SlideKind::Content,
            title: format!("Slide {}", index),
            content: SlideContent::Bullets(vec!["a".to_string(), "b".to_string()]),
            content_design: design.to_string(),
            visual_suggestions: String::new(),
            narration_script: String::new(),
        }
    }

    fn config(audience: &str) -> CourseConfig {
        CourseConfig {
            narrative_style: "formal".to_string(),
            target_audience: audience.to_string(),
            duration: String::new(),
            objectives: vec![],
            expected_page_count: 1,
        }
    }

    #[test]
    fn test_document_title_fallbacks() {
        let outline = VideoOutline {
            theme: "Lifetimes".to_string(),
            knowledge_units: vec![],
        };
        let cfg = config("students");

        assert_eq!(
            document_title(Some(&cfg), &[script(0, "Overview")], Some(&outline), "goal"),
            "students - Overview"
        );
        assert_eq!(
            document_title(Some(&cfg), &[script(0, " ")], Some(&outline), "goal"),
            "Lifetimes"
        );
        assert_eq!(document_title(None, &[script(0, "x")], None, "goal"), "goal");
    }

    #[test]
    fn test_page_inputs_join_bullets() {
        let theme: PresentationTheme = serde_json::from_value(json!({
            "theme_name": "Dark",
            "color_scheme": {"primary": "#1", "secondary": "#2", "accent": "#3", "background": "#4", "text": "#5"},
            "font_config": {"title_font": "A", "body_font": "B", "title_size": 1, "body_size": 1}
        }))
        .unwrap();
        let inputs = page_inputs(&script(2, ""), &theme, "Course", 3, None);
        assert_eq!(inputs["content"], "a; b");
        assert_eq!(inputs["primary_color"], "#1");
        assert_eq!(inputs["type"], "content");
        assert!(inputs["refinement_prompt"].is_null());
    }
}
