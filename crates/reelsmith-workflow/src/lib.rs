//! Event-driven workflow engine for multi-agent content pipelines.
//!
//! A [`Workflow`] is a graph of [`Step`]s routed by event kind, with
//! fan-out into concurrent branches, round-tagged joins and bounded
//! loop-backs. The [`flows`] module builds the ideation, research and
//! scripting workflows on top of it.

pub mod engine;
pub mod error;
pub mod event;
pub mod flows;
pub mod gate;
pub mod join;
mod metrics;
pub mod persist;
pub mod prompts;
pub mod report;
pub mod stage;
pub mod step;

pub use engine::{RunOutcome, RunState, Workflow, WorkflowBuilder};
pub use error::WorkflowError;
pub use event::{Emission, Emits, Input, StartEvent, StopEvent, Trigger, WorkflowEvent, WorkflowOutput};
pub use gate::{GateDecision, ScoreGate, parse_total_score};
pub use join::JoinSpec;
pub use report::Report;
pub use stage::Services;
pub use step::{JoinStep, Step, StepContext};
