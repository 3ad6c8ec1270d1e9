//! Scripted collaborators for driving the orchestrator without a network.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use deckpilot::artifact::SearchHit;
use deckpilot::events::BroadcastEventSink;
use deckpilot::oracle::{ContentOracle, GenerationKind, OracleError};
use deckpilot::search::{SearchError, SearchProvider};
use deckpilot::store::MemoryStore;
use deckpilot::{Orchestrator, OrchestratorConfig, Services};

pub const AUDIENCE: &str = "engineers";

/// Oracle with canned answers per generation kind.
///
/// Without a scripted plan, planning fails and the orchestrator falls back
/// to the template.
#[derive(Default)]
pub struct ScriptedOracle {
    plan: Mutex<Option<Value>>,
    /// Remaining failures per kind; `u32::MAX` fails forever
    failures: Mutex<HashMap<GenerationKind, u32>>,
    /// Task types whose results are judged as needing refinement
    poor_quality: Mutex<HashSet<String>>,
    outline_units: Mutex<usize>,
    calls: Mutex<Vec<GenerationKind>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, plan: Value) -> Self {
        *self.plan.lock().unwrap() = Some(plan);
        self
    }

    pub fn failing(self, kind: GenerationKind, times: u32) -> Self {
        self.failures.lock().unwrap().insert(kind, times);
        self
    }

    pub fn always_failing(self, kind: GenerationKind) -> Self {
        self.failing(kind, u32::MAX)
    }

    pub fn poor_quality_for(self, task_type: &str) -> Self {
        self.poor_quality.lock().unwrap().insert(task_type.to_string());
        self
    }

    pub fn with_outline_units(self, units: usize) -> Self {
        *self.outline_units.lock().unwrap() = units;
        self
    }

    pub fn calls(&self, kind: GenerationKind) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    fn should_fail(&self, kind: GenerationKind) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&kind) {
            None => false,
            Some(remaining) if *remaining == 0 => false,
            Some(remaining) if *remaining == u32::MAX => true,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl ContentOracle for ScriptedOracle {
    async fn generate(&self, kind: GenerationKind, inputs: Value) -> Result<Value, OracleError> {
        self.calls.lock().unwrap().push(kind);
        if self.should_fail(kind) {
            return Err(OracleError::Request(format!("scripted {} failure", kind)));
        }

        match kind {
            GenerationKind::TaskPlan => self
                .plan
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| OracleError::Unavailable("no scripted plan".to_string())),
            GenerationKind::TaskSuggestion => {
                Err(OracleError::Unavailable("no scripted suggestion".to_string()))
            }
            GenerationKind::Analysis => Ok(json!({
                "summary": "Ownership for engineers",
                "key_points": ["moves", "borrows"]
            })),
            GenerationKind::CourseConfig => Ok(json!({
                "narrative_style": "technical",
                "target_audience": AUDIENCE,
                "duration": "10 minutes",
                "objectives": ["explain borrowing"],
                "expected_page_count": 2
            })),
            GenerationKind::Outline => {
                let units: Vec<Value> = (0..*self.outline_units.lock().unwrap())
                    .map(|i| json!({"title": format!("Unit {}", i + 1), "knowledge_points": []}))
                    .collect();
                Ok(json!({"theme": "Ownership", "knowledge_units": units}))
            }
            GenerationKind::SlideScripts => Ok(json!([
                {"slide_index": 0, "type": "title", "title": "Ownership", "content": "Welcome", "content_design": "Ownership basics"},
                {"slide_index": 1, "type": "closing", "title": "Questions", "content": ["Q&A"]}
            ])),
            GenerationKind::Theme => Ok(json!({
                "theme_name": "Ferris",
                "color_scheme": {
                    "primary": "#b7410e", "secondary": "#333", "accent": "#f74c00",
                    "background": "#fff", "text": "#111"
                },
                "font_config": {"title_font": "Inter", "body_font": "Inter", "title_size": 40, "body_size": 20}
            })),
            GenerationKind::SlidePage => Ok(json!({
                "slide_index": inputs["slide_index"],
                "html": format!("<section>{}</section>", inputs["slide_index"])
            })),
            GenerationKind::QualityCheck => {
                let task_type = inputs["task_type"].as_str().unwrap_or_default().to_string();
                if self.poor_quality.lock().unwrap().contains(&task_type) {
                    Ok(json!({
                        "is_complete": true, "meets_expectations": false, "has_errors": false,
                        "issues": ["objectives are vague"], "score": 40, "needs_refinement": true
                    }))
                } else {
                    Ok(json!({
                        "is_complete": true, "meets_expectations": true, "has_errors": false,
                        "issues": [], "score": 90, "needs_refinement": false
                    }))
                }
            }
        }
    }
}

/// Returns one hit per query; queries containing "boom" fail.
pub struct StaticSearch;

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        if query.contains("boom") {
            return Err(SearchError::Status(503));
        }
        Ok(vec![SearchHit {
            title: format!("About {}", query),
            url: "https://example.com/article".to_string(),
            snippet: "A useful article".to_string(),
        }])
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub oracle: Arc<ScriptedOracle>,
    pub store: MemoryStore,
    pub events: BroadcastEventSink,
}

pub fn harness(oracle: ScriptedOracle) -> Harness {
    harness_with(oracle, OrchestratorConfig::default(), MemoryStore::new())
}

pub fn harness_with(oracle: ScriptedOracle, config: OrchestratorConfig, store: MemoryStore) -> Harness {
    let oracle = Arc::new(oracle);
    let events = BroadcastEventSink::new(1024);
    let orchestrator = Orchestrator::new(
        Services {
            oracle: oracle.clone(),
            search: Arc::new(StaticSearch),
            artifacts: Arc::new(store.clone()),
            checkpoints: Arc::new(store.clone()),
            events: Arc::new(events.clone()),
        },
        config,
    );
    Harness {
        orchestrator,
        oracle,
        store,
        events,
    }
}
