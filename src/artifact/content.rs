//! Typed artifact payloads.
//!
//! Optional-looking fields default when absent so that slightly incomplete
//! oracle output still deserializes.

use serde::{Deserialize, Serialize};

/// Requirement analysis of the user's goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementAnalysis {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Basic configuration of the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
    /// Formal, casual, technical, ...
    pub narrative_style: String,
    pub target_audience: String,
    /// Expected presentation length
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    pub expected_page_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgePoint {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUnit {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub knowledge_points: Vec<KnowledgePoint>,
}

/// Structure of the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutline {
    pub theme: String,
    pub knowledge_units: Vec<KnowledgeUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
    Title,
    Content,
    Closing,
}

/// Slide body: a paragraph or a list of bullets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlideContent {
    Text(String),
    Bullets(Vec<String>),
}

/// Script for one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideScript {
    pub slide_index: u32,
    #[serde(rename = "type")]
    pub kind: SlideKind,
    pub title: String,
    pub content: SlideContent,
    #[serde(default)]
    pub content_design: String,
    #[serde(default)]
    pub visual_suggestions: String,
    #[serde(default)]
    pub narration_script: String,
}

/// Scripts for every slide, in slide order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSet {
    pub scripts: Vec<SlideScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub background: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    pub title_font: String,
    pub body_font: String,
    pub title_size: u32,
    pub body_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSlide {
    /// title, content or section
    #[serde(rename = "type")]
    pub kind: String,
    pub layout: String,
}

/// Visual theme of the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationTheme {
    pub theme_name: String,
    #[serde(default)]
    pub design_style: String,
    pub color_scheme: ColorScheme,
    pub font_config: FontConfig,
    #[serde(default)]
    pub master_slides: Vec<MasterSlide>,
}

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideHtml {
    pub slide_index: u32,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak_notes: Option<String>,
}

/// The final rendered deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PptHtmlDocument {
    pub title: String,
    pub pages: Vec<SlideHtml>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Hits for one web search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

/// Quality evaluation of a task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheckResult {
    pub is_complete: bool,
    pub meets_expectations: bool,
    pub has_errors: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    /// 0-100; evaluators may send fractions
    pub score: f64,
    pub needs_refinement: bool,
}

impl QualityCheckResult {
    /// Verdict used when no evaluator is available.
    pub fn assumed_good() -> Self {
        Self {
            is_complete: true,
            meets_expectations: true,
            has_errors: false,
            issues: Vec::new(),
            score: 80.0,
            needs_refinement: false,
        }
    }

    /// Clamp the score into 0-100.
    pub fn normalized(mut self) -> Self {
        self.score = self.score.clamp(0.0, 100.0);
        self
    }
}
