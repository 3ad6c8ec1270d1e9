//! Artifacts - immutable, typed outputs of completed tasks.
//!
//! Later tasks never read earlier tasks' results directly; they look up the
//! latest artifact of the kind they need. When several artifacts of one kind
//! exist (a refined course config, say), the last one written wins.

mod content;

pub use content::{
    ColorScheme, CourseConfig, FontConfig, KnowledgePoint, KnowledgeUnit, MasterSlide,
    PptHtmlDocument, PresentationTheme, QualityCheckResult, RequirementAnalysis, ScriptSet,
    SearchHit, SearchResults, SlideContent, SlideHtml, SlideKind, SlideScript, VideoOutline,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    Analysis,
    CourseConfig,
    Outline,
    ScriptSet,
    Theme,
    PageHtml,
    SearchResult,
    Validation,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::CourseConfig => "course-config",
            Self::Outline => "outline",
            Self::ScriptSet => "script-set",
            Self::Theme => "theme",
            Self::PageHtml => "page-html",
            Self::SearchResult => "search-result",
            Self::Validation => "validation",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact payload, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ArtifactContent {
    Analysis(RequirementAnalysis),
    CourseConfig(CourseConfig),
    Outline(VideoOutline),
    ScriptSet(ScriptSet),
    Theme(PresentationTheme),
    PageHtml(PptHtmlDocument),
    SearchResult(SearchResults),
    Validation(QualityCheckResult),
}

impl ArtifactContent {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Analysis(_) => ArtifactKind::Analysis,
            Self::CourseConfig(_) => ArtifactKind::CourseConfig,
            Self::Outline(_) => ArtifactKind::Outline,
            Self::ScriptSet(_) => ArtifactKind::ScriptSet,
            Self::Theme(_) => ArtifactKind::Theme,
            Self::PageHtml(_) => ArtifactKind::PageHtml,
            Self::SearchResult(_) => ArtifactKind::SearchResult,
            Self::Validation(_) => ArtifactKind::Validation,
        }
    }

    pub fn as_analysis(&self) -> Option<&RequirementAnalysis> {
        match self {
            Self::Analysis(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_course_config(&self) -> Option<&CourseConfig> {
        match self {
            Self::CourseConfig(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_outline(&self) -> Option<&VideoOutline> {
        match self {
            Self::Outline(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_script_set(&self) -> Option<&ScriptSet> {
        match self {
            Self::ScriptSet(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_theme(&self) -> Option<&PresentationTheme> {
        match self {
            Self::Theme(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&PptHtmlDocument> {
        match self {
            Self::PageHtml(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_search_results(&self) -> Option<&SearchResults> {
        match self {
            Self::SearchResult(r) => Some(r),
            _ => None,
        }
    }
}

/// An immutable, typed output produced by exactly one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub content: ArtifactContent,
    /// Starts at 1 and increases per kind within a session
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl Artifact {
    pub fn new(id: impl Into<String>, content: ArtifactContent, version: u32) -> Self {
        Self {
            id: id.into(),
            content,
            version,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.content.kind()
    }
}

/// Last artifact of `kind` in write order.
pub fn latest_of_kind(artifacts: &[Artifact], kind: ArtifactKind) -> Option<&Artifact> {
    artifacts.iter().rev().find(|a| a.kind() == kind)
}

/// Last payload matched by `pick`, in write order.
pub fn latest_with<'a, T>(
    artifacts: &'a [Artifact],
    pick: fn(&ArtifactContent) -> Option<&T>,
) -> Option<&'a T>
where
    T: 'a,
{
    artifacts.iter().rev().find_map(|a| pick(&a.content))
}

/// Whether an artifact of every kind in `kinds` exists.
pub fn has_all_kinds(artifacts: &[Artifact], kinds: &[ArtifactKind]) -> bool {
    kinds
        .iter()
        .all(|kind| artifacts.iter().any(|a| a.kind() == *kind))
}

/// Version the next artifact of `kind` should carry.
pub fn next_version(artifacts: &[Artifact], kind: ArtifactKind) -> u32 {
    artifacts
        .iter()
        .filter(|a| a.kind() == kind)
        .map(|a| a.version)
        .max()
        .unwrap_or(0)
        + 1
}
