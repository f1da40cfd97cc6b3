//! Agent-backed steps and the services they share.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use reelsmith_agent::AgentInvoker;
use reelsmith_core::config::Config;
use reelsmith_tools::ToolSet;

use crate::error::WorkflowError;
use crate::event::{Emission, Emits, Input, StartEvent, Trigger, WorkflowEvent};
use crate::gate::ScoreGate;
use crate::persist::StageArchive;
use crate::prompts::Prompts;
use crate::step::{Step, StepContext};

/// Everything a concrete workflow needs to build its steps.
#[derive(Clone)]
pub struct Services {
    pub agent: AgentInvoker,
    pub archive: Option<StageArchive>,
    pub prompts: Prompts,
    pub gate: ScoreGate,
    pub timeout: Duration,
    pub max_revisions: u32,
}

impl Services {
    /// Settings from `config`. Stage outputs are archived to the agent's
    /// document store when one is configured.
    pub fn from_config(config: &Config, agent: AgentInvoker) -> Self {
        let archive = agent
            .tool_context()
            .documents
            .clone()
            .map(StageArchive::new);
        Self {
            archive,
            prompts: Prompts::from_config(config),
            gate: ScoreGate::from_config(config),
            timeout: config.timeout(),
            max_revisions: config.max_revisions(),
            agent,
        }
    }

    pub fn with_archive(mut self, archive: Option<StageArchive>) -> Self {
        self.archive = archive;
        self
    }
}

/// Builds the agent input from the step input.
pub type ComposeFn<E> = fn(&Input<E>, &StepContext) -> Result<String, WorkflowError>;
/// Turns the agent's answer into the step's emission.
pub type FinishFn<E> = fn(String) -> Emission<E>;

/// A step that runs one agent turn and records the answer in the report
/// under its stage name.
pub struct AgentStage<E: WorkflowEvent> {
    /// Report key and prompt key.
    pub stage: &'static str,
    /// Archive title; `None` skips archiving.
    pub title: Option<&'static str>,
    pub accepts: Trigger<E::Kind>,
    pub emits: Vec<Emits<E::Kind>>,
    pub tools: ToolSet,
    pub services: Arc<Services>,
    pub compose: ComposeFn<E>,
    pub finish: FinishFn<E>,
}

#[async_trait]
impl<E: WorkflowEvent> Step<E> for AgentStage<E> {
    fn name(&self) -> &str {
        self.stage
    }

    fn accepts(&self) -> Trigger<E::Kind> {
        self.accepts
    }

    fn emits(&self) -> Vec<Emits<E::Kind>> {
        self.emits.clone()
    }

    #[instrument(name = "agent_stage", skip_all, fields(stage = self.stage, round = ctx.round))]
    async fn run(&self, input: Input<E>, ctx: &StepContext) -> Result<Emission<E>, WorkflowError> {
        let prompt = (self.compose)(&input, ctx)?;
        let system = self.services.prompts.system(self.stage);

        let reply = self
            .services
            .agent
            .invoke(&system, &self.tools, &prompt, &[])
            .await
            .inspect_err(|e| warn!(stage = self.stage, error = %e, "Agent turn failed"))?;

        info!(
            stage = self.stage,
            chars = reply.text.len(),
            tool_calls = reply.tool_calls,
            "Stage complete"
        );
        ctx.report.insert(self.stage, reply.text.clone());
        if let (Some(title), Some(archive)) = (self.title, &self.services.archive) {
            archive.save(title, &reply.text);
        }
        Ok((self.finish)(reply.text))
    }
}

/// Builds the first agent input from the start event.
pub type BriefFn = fn(&StartEvent, &StepContext) -> Result<String, WorkflowError>;

/// Entry step of a workflow: validates the start event and hands the first
/// agent its input.
pub struct BriefStep<E: WorkflowEvent> {
    pub emits: E::Kind,
    pub compose: BriefFn,
    pub wrap: fn(String) -> E,
}

#[async_trait]
impl<E: WorkflowEvent> Step<E> for BriefStep<E> {
    fn name(&self) -> &str {
        "brief"
    }

    fn accepts(&self) -> Trigger<E::Kind> {
        Trigger::Start
    }

    fn emits(&self) -> Vec<Emits<E::Kind>> {
        vec![Emits::Event(self.emits)]
    }

    async fn run(&self, _input: Input<E>, ctx: &StepContext) -> Result<Emission<E>, WorkflowError> {
        let prompt = (self.compose)(&ctx.start, ctx)?;
        Ok(Emission::next((self.wrap)(prompt)))
    }
}

/// The text payload of an intermediate event, or a step error naming the
/// step when it was triggered by something else.
pub fn event_text<E, F>(input: &Input<E>, step: &str, text: F) -> Result<String, WorkflowError>
where
    F: Fn(&E) -> &str,
{
    input
        .event()
        .map(|e| text(e).to_string())
        .ok_or_else(|| WorkflowError::step(step, "expected an intermediate event"))
}
