//! Step traits and the context handed to every step.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkflowError;
use crate::event::{Emission, Emits, Input, StartEvent, Trigger, WorkflowEvent};
use crate::join::JoinSpec;
use crate::report::Report;

/// Run-scoped state visible to a step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: String,
    /// Loop-back round this step belongs to. Starts at 0.
    pub round: u32,
    pub report: Report,
    pub start: Arc<StartEvent>,
}

impl StepContext {
    pub(crate) fn for_round(&self, round: u32) -> Self {
        Self {
            round,
            ..self.clone()
        }
    }
}

/// A node that consumes one event type.
#[async_trait]
pub trait Step<E: WorkflowEvent>: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self) -> Trigger<E::Kind>;

    /// Every output this step may produce.
    fn emits(&self) -> Vec<Emits<E::Kind>>;

    async fn run(&self, input: Input<E>, ctx: &StepContext) -> Result<Emission<E>, WorkflowError>;
}

/// A fan-in node. Its body runs once per round, after every expected
/// arrival for that round is present.
#[async_trait]
pub trait JoinStep<E: WorkflowEvent>: Send + Sync {
    fn name(&self) -> &str;

    fn expects(&self) -> JoinSpec<E::Kind>;

    fn emits(&self) -> Vec<Emits<E::Kind>>;

    /// `arrivals` holds the round's events in arrival order.
    async fn run(&self, arrivals: Vec<E>, ctx: &StepContext) -> Result<Emission<E>, WorkflowError>;
}
