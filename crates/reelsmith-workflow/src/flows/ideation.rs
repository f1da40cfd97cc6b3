//! Ideation: trend analysis, then SEO validation, then content strategy.

use std::sync::Arc;

use crate::engine::Workflow;
use crate::error::WorkflowError;
use crate::event::{Emission, Emits, StartEvent, StopEvent, Trigger, WorkflowEvent};
use crate::prompts::{CONTENT_STRATEGY, SEO_ANALYSIS, TREND_ANALYSIS};
use crate::stage::{AgentStage, BriefStep, Services, event_text};
use crate::step::StepContext;

use super::{seo_tools, strategist_tools, trend_tools};

#[derive(Debug, Clone, PartialEq)]
pub enum IdeationEvent {
    TopicBriefed(String),
    TrendsAnalysed(String),
    SeoAnalysed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdeationKind {
    TopicBriefed,
    TrendsAnalysed,
    SeoAnalysed,
}

impl IdeationEvent {
    fn text(&self) -> &str {
        match self {
            Self::TopicBriefed(t) | Self::TrendsAnalysed(t) | Self::SeoAnalysed(t) => t,
        }
    }
}

impl WorkflowEvent for IdeationEvent {
    type Kind = IdeationKind;

    fn kind(&self) -> IdeationKind {
        match self {
            Self::TopicBriefed(_) => IdeationKind::TopicBriefed,
            Self::TrendsAnalysed(_) => IdeationKind::TrendsAnalysed,
            Self::SeoAnalysed(_) => IdeationKind::SeoAnalysed,
        }
    }
}

fn brief(start: &StartEvent, _ctx: &StepContext) -> Result<String, WorkflowError> {
    let topic = start.require_str("input")?;
    let mut prompt = format!("Here is the initial topic I need youtube ideas on - {topic}.");
    if let Some(history) = start.get_str("chat_history") {
        prompt.push_str("\n\nPrevious conversation:\n");
        prompt.push_str(history);
    }
    Ok(prompt)
}

/// Build the ideation workflow. Start field: `input`, optionally
/// `chat_history`. Result: the content strategist's text.
pub fn ideation_workflow(services: Arc<Services>) -> Result<Workflow<IdeationEvent>, WorkflowError> {
    Workflow::<IdeationEvent>::builder("ideation")
        .require("input")
        .timeout(services.timeout)
        .max_revisions(services.max_revisions)
        .step(BriefStep {
            emits: IdeationKind::TopicBriefed,
            compose: brief,
            wrap: IdeationEvent::TopicBriefed,
        })
        .step(AgentStage {
            stage: TREND_ANALYSIS,
            title: Some("Trend And Audience Analysis"),
            accepts: Trigger::Event(IdeationKind::TopicBriefed),
            emits: vec![Emits::Event(IdeationKind::TrendsAnalysed)],
            tools: trend_tools(),
            services: services.clone(),
            compose: |input, _| event_text(input, TREND_ANALYSIS, IdeationEvent::text),
            finish: |text| Emission::next(IdeationEvent::TrendsAnalysed(text)),
        })
        .step(AgentStage {
            stage: SEO_ANALYSIS,
            title: Some("SEO Analysis"),
            accepts: Trigger::Event(IdeationKind::TrendsAnalysed),
            emits: vec![Emits::Event(IdeationKind::SeoAnalysed)],
            tools: seo_tools(),
            services: services.clone(),
            compose: |input, _| {
                let trends = event_text(input, SEO_ANALYSIS, IdeationEvent::text)?;
                Ok(format!(
                    "Here is the output of the Target Audience Trend Alchemist: {trends}. \
                     I need you to validate the topics, titles, and thumbnails for search optimization."
                ))
            },
            finish: |text| Emission::next(IdeationEvent::SeoAnalysed(text)),
        })
        .step(AgentStage {
            stage: CONTENT_STRATEGY,
            title: Some("Content Strategist"),
            accepts: Trigger::Event(IdeationKind::SeoAnalysed),
            emits: vec![Emits::Stop],
            tools: strategist_tools(),
            services,
            compose: |_, ctx| {
                let trends = ctx.report.get(TREND_ANALYSIS).unwrap_or_default();
                let seo = ctx.report.get(SEO_ANALYSIS).unwrap_or_default();
                Ok(format!(
                    "This is the output of the Target_Audience_Trend_Alchemist: {trends}. \
                     This is the output of the SEO_Platform_Strategist: {seo}"
                ))
            },
            finish: |text| Emission::Stop(StopEvent::text(text)),
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Report;

    fn ctx(start: StartEvent) -> StepContext {
        StepContext {
            run_id: "test".into(),
            round: 0,
            report: Report::new(),
            start: Arc::new(start),
        }
    }

    #[test]
    fn test_brief_embeds_topic_and_history() {
        let start = StartEvent::new()
            .with("input", "sugar metabolism")
            .with("chat_history", "user: hi");
        let prompt = brief(&start, &ctx(start.clone())).unwrap();
        assert!(prompt.starts_with("Here is the initial topic I need youtube ideas on - sugar metabolism."));
        assert!(prompt.ends_with("user: hi"));
    }

    #[test]
    fn test_brief_requires_input() {
        let start = StartEvent::new();
        assert!(matches!(
            brief(&start, &ctx(start.clone())),
            Err(WorkflowError::MissingStartField(_))
        ));
    }
}
