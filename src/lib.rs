//! # deckpilot
//!
//! An autonomous task orchestrator that turns a natural-language goal into a
//! slide deck by planning a graph of tasks, running them one at a time and
//! reflecting on every result.
//!
//! This library provides:
//! - A task graph model with dependency conditions and retry bookkeeping
//! - A deterministic scheduler (priority, then insertion order)
//! - An oracle-backed planner with a fixed fallback template
//! - Per-task-type executors that produce typed artifacts
//! - A reflector that judges results and suggests follow-up tasks
//! - A control loop with retry, skip and abort semantics and resumable
//!   checkpoints
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────────────────┐
//!        │                 Orchestrator                 │
//!        │  Planning → Scheduling → Executing →         │
//!        │  Reflecting → (Scheduling | Stopped)         │
//!        └──┬──────────┬───────────┬───────────┬────────┘
//!           │          │           │           │
//!           ▼          ▼           ▼           ▼
//!       Planner    Scheduler   TaskExecutor  Reflector
//!           │                      │           │
//!           └──────────┬───────────┴───────────┘
//!                      ▼
//!               ContentOracle ──▶ LlmClient (OpenRouter)
//! ```
//!
//! ## Modules
//! - `task`: Task graph model and structural validation
//! - `artifact`: Typed task outputs
//! - `scheduler`: Readiness, selection and status propagation
//! - `planner`: Initial plans and mid-run task insertion
//! - `executor`: One handler per task type
//! - `reflector`: Post-task evaluation
//! - `orchestrator`: The control loop
//! - `oracle`, `llm`, `search`: External content and search services
//! - `store`, `events`: Persistence and progress notification

pub mod artifact;
pub mod config;
pub mod events;
pub mod executor;
pub mod llm;
pub mod oracle;
pub mod orchestrator;
pub mod planner;
pub mod reflector;
pub mod scheduler;
pub mod search;
pub mod store;
pub mod task;

pub use artifact::{Artifact, ArtifactContent, ArtifactKind};
pub use config::{Config, OrchestratorConfig, PlanningMode};
pub use orchestrator::{Orchestrator, OrchestratorError, RunOutcome, RunReport, RunRequest, Services};
pub use task::{Task, TaskList, TaskStatus, TaskType};
