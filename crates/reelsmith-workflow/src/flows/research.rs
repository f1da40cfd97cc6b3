//! Research: find sources for the chosen ideas, then curate and save them.

use std::sync::Arc;

use crate::engine::Workflow;
use crate::error::WorkflowError;
use crate::event::{Emission, Emits, StartEvent, StopEvent, Trigger, WorkflowEvent};
use crate::prompts::{KNOWLEDGE_CURATOR, RESEARCH_NAVIGATOR};
use crate::stage::{AgentStage, BriefStep, Services, event_text};
use crate::step::StepContext;

use super::{curator_tools, navigator_tools};

#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    ResearchBriefed(String),
    SourcesFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResearchKind {
    ResearchBriefed,
    SourcesFound,
}

impl ResearchEvent {
    fn text(&self) -> &str {
        match self {
            Self::ResearchBriefed(t) | Self::SourcesFound(t) => t,
        }
    }
}

impl WorkflowEvent for ResearchEvent {
    type Kind = ResearchKind;

    fn kind(&self) -> ResearchKind {
        match self {
            Self::ResearchBriefed(_) => ResearchKind::ResearchBriefed,
            Self::SourcesFound(_) => ResearchKind::SourcesFound,
        }
    }
}

fn brief(start: &StartEvent, _ctx: &StepContext) -> Result<String, WorkflowError> {
    let topic = start.require_str("input")?;
    let ideation = start.require_str("ideation")?;
    Ok(format!(
        "Here is the initial topic - {topic}. I need you to find statistics, studies, examples \
         from reputable scientific sources and store properly. Here are the 3 idea sets \
         finalized: {ideation}"
    ))
}

/// Build the research workflow. Start fields: `input` and `ideation` (the
/// ideation result). Result: the curator's text.
pub fn research_workflow(services: Arc<Services>) -> Result<Workflow<ResearchEvent>, WorkflowError> {
    Workflow::<ResearchEvent>::builder("research")
        .require("input")
        .require("ideation")
        .timeout(services.timeout)
        .max_revisions(services.max_revisions)
        .step(BriefStep {
            emits: ResearchKind::ResearchBriefed,
            compose: brief,
            wrap: ResearchEvent::ResearchBriefed,
        })
        .step(AgentStage {
            stage: RESEARCH_NAVIGATOR,
            title: Some("Research Navigator"),
            accepts: Trigger::Event(ResearchKind::ResearchBriefed),
            emits: vec![Emits::Event(ResearchKind::SourcesFound)],
            tools: navigator_tools(),
            services: services.clone(),
            compose: |input, _| event_text(input, RESEARCH_NAVIGATOR, ResearchEvent::text),
            finish: |text| Emission::next(ResearchEvent::SourcesFound(text)),
        })
        .step(AgentStage {
            stage: KNOWLEDGE_CURATOR,
            title: Some("Knowledge Curator Fact Checker"),
            accepts: Trigger::Event(ResearchKind::SourcesFound),
            emits: vec![Emits::Stop],
            tools: curator_tools(),
            services,
            compose: |input, _| {
                let sources = event_text(input, KNOWLEDGE_CURATOR, ResearchEvent::text)?;
                Ok(format!("Here is the output of the Research_Navigator: {sources}"))
            },
            finish: |text| Emission::Stop(StopEvent::text(text)),
        })
        .build()
}
