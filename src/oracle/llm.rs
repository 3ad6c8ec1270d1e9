//! Oracle backed by a chat-completion model.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::{ContentOracle, GenerationKind, OracleError};
use crate::llm::{ChatMessage, ChatRequest, LlmClient};

/// Models often wrap JSON in a markdown fence even in JSON mode.
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("code fence pattern is valid")
});

pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f64,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.4,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ContentOracle for LlmOracle {
    async fn generate(&self, kind: GenerationKind, inputs: Value) -> Result<Value, OracleError> {
        let inputs = serde_json::to_string_pretty(&inputs).map_err(|e| {
            OracleError::Request(format!("Failed to encode {} inputs: {}", kind, e))
        })?;
        let messages = vec![
            ChatMessage::system(format!(
                "{}\n\nRespond with a single JSON value and nothing else.\n{}",
                instructions(kind),
                output_shape(kind)
            )),
            ChatMessage::user(inputs),
        ];

        let request = ChatRequest::new(self.model.clone(), messages)
            .with_temperature(self.temperature)
            .json();

        tracing::debug!("Requesting {} from {}", kind, self.model);
        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let content = response.content.ok_or_else(|| OracleError::Malformed {
            kind,
            message: "empty completion".to_string(),
        })?;

        parse_json_payload(&content).map_err(|message| OracleError::Malformed { kind, message })
    }
}

/// Parse model output as JSON, tolerating a surrounding markdown fence.
fn parse_json_payload(content: &str) -> Result<Value, String> {
    let body = CODE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();
    serde_json::from_str(body).map_err(|e| format!("{} (output began with {:?})", e, preview(body)))
}

fn preview(s: &str) -> String {
    s.chars().take(80).collect()
}

fn instructions(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::TaskPlan => {
            "You plan the production of a slide deck. Break the user's goal into tasks. \
             Allowed task types: analyze, configure, outline, script, theme, render, search, \
             validate. Every dependency must reference the id of another task in the plan \
             and the plan must be acyclic. Exactly one render task comes last."
        }
        GenerationKind::TaskSuggestion => {
            "A slide deck is being produced from the task list given. Propose one additional \
             task that addresses the stated reason. Depend only on existing task ids."
        }
        GenerationKind::Analysis => {
            "Analyze the user's goal for a slide deck. Summarize what the audience needs and \
             list the key points the deck must cover."
        }
        GenerationKind::CourseConfig => {
            "Produce the basic configuration of a slide deck from the goal and its analysis: \
             narrative style, target audience, duration, learning objectives and the number \
             of pages. Apply the refinement prompt if one is given."
        }
        GenerationKind::Outline => {
            "Produce the outline of a slide deck from its configuration: an overall theme and \
             knowledge units, each with knowledge points. Apply the refinement prompt if one \
             is given."
        }
        GenerationKind::SlideScripts => {
            "Write one script per slide from the outline and configuration. The first slide is \
             a title slide and the last a closing slide. Produce as many slides as the \
             configuration's expected page count. Apply the refinement prompt if one is given."
        }
        GenerationKind::Theme => {
            "Design the visual theme of a slide deck from its configuration and outline: \
             name, design style, colors, fonts and master slide layouts. Apply the \
             refinement prompt if one is given."
        }
        GenerationKind::SlidePage => {
            "Render one slide as a self-contained 16:9 HTML fragment with inline styles, using \
             the theme colors given. Include short speaker notes."
        }
        GenerationKind::QualityCheck => {
            "Review the result of a deck-production task. Judge completeness, whether it meets \
             the goal and whether it contains errors. Score it from 0 to 100 and request \
             refinement only for concrete, fixable issues."
        }
    }
}

fn output_shape(kind: GenerationKind) -> &'static str {
    match kind {
        GenerationKind::TaskPlan => {
            r#"Shape: {"tasks": [{"id": string, "type": string, "description": string, "priority": int, "parameters": object, "dependencies": [{"task_id": string, "condition": "success"|"any"|"all"}]}]}"#
        }
        GenerationKind::TaskSuggestion => {
            r#"Shape: {"type": string, "description": string, "priority": int, "parameters": object, "dependencies": [{"task_id": string, "condition": "success"|"any"|"all"}]}"#
        }
        GenerationKind::Analysis => r#"Shape: {"summary": string, "key_points": [string]}"#,
        GenerationKind::CourseConfig => {
            r#"Shape: {"narrative_style": string, "target_audience": string, "duration": string, "objectives": [string], "expected_page_count": int}"#
        }
        GenerationKind::Outline => {
            r#"Shape: {"theme": string, "knowledge_units": [{"title": string, "description": string, "knowledge_points": [{"title": string, "description": string}]}]}"#
        }
        GenerationKind::SlideScripts => {
            r#"Shape: {"scripts": [{"slide_index": int, "type": "title"|"content"|"closing", "title": string, "content": string or [string], "content_design": string, "visual_suggestions": string, "narration_script": string}]}"#
        }
        GenerationKind::Theme => {
            r#"Shape: {"theme_name": string, "design_style": string, "color_scheme": {"primary": string, "secondary": string, "accent": string, "background": string, "text": string}, "font_config": {"title_font": string, "body_font": string, "title_size": int, "body_size": int}, "master_slides": [{"type": string, "layout": string}]}"#
        }
        GenerationKind::SlidePage => {
            r#"Shape: {"slide_index": int, "html": string, "speak_notes": string}"#
        }
        GenerationKind::QualityCheck => {
            r#"Shape: {"is_complete": bool, "meets_expectations": bool, "has_errors": bool, "issues": [string], "score": number 0-100, "needs_refinement": bool}"#
        }
    }
}
