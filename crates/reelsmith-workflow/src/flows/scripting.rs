//! Scripting: draft a script, have two evaluators score it in parallel and
//! loop back to the scriptwriter until both scores pass.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tracing::{info, instrument};

use crate::engine::Workflow;
use crate::error::WorkflowError;
use crate::event::{Emission, Emits, StartEvent, StopEvent, Trigger, WorkflowEvent};
use crate::gate::GateDecision;
use crate::join::JoinSpec;
use crate::prompts::{GEORGE_BLACKMAN, MR_BEAST, SCRIPTWRITER};
use crate::stage::{AgentStage, BriefStep, Services, event_text};
use crate::step::{JoinStep, StepContext};

use super::scriptwriter_tools;

pub const IDEATION_OUTPUT: &str = "ideation_output";
pub const RESEARCH_OUTPUT: &str = "research_output";

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptingEvent {
    /// Scriptwriter input: the first brief or a revision request.
    ScriptRequested(String),
    GeorgeBlackmanReview(String),
    MrBeastReview(String),
    GeorgeBlackmanScored(String),
    MrBeastScored(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptingKind {
    ScriptRequested,
    GeorgeBlackmanReview,
    MrBeastReview,
    GeorgeBlackmanScored,
    MrBeastScored,
}

impl ScriptingEvent {
    fn text(&self) -> &str {
        match self {
            Self::ScriptRequested(t)
            | Self::GeorgeBlackmanReview(t)
            | Self::MrBeastReview(t)
            | Self::GeorgeBlackmanScored(t)
            | Self::MrBeastScored(t) => t,
        }
    }
}

impl WorkflowEvent for ScriptingEvent {
    type Kind = ScriptingKind;

    fn kind(&self) -> ScriptingKind {
        match self {
            Self::ScriptRequested(_) => ScriptingKind::ScriptRequested,
            Self::GeorgeBlackmanReview(_) => ScriptingKind::GeorgeBlackmanReview,
            Self::MrBeastReview(_) => ScriptingKind::MrBeastReview,
            Self::GeorgeBlackmanScored(_) => ScriptingKind::GeorgeBlackmanScored,
            Self::MrBeastScored(_) => ScriptingKind::MrBeastScored,
        }
    }
}

fn brief(start: &StartEvent, ctx: &StepContext) -> Result<String, WorkflowError> {
    let ideation = start.require_str("ideation")?;
    let research = start.require_str("research")?;
    ctx.report.insert(IDEATION_OUTPUT, ideation);
    ctx.report.insert(RESEARCH_OUTPUT, research);
    Ok(format!(
        "Here is the chosen set from output of Team 1 (Ideation Workflow): {ideation}. \
         Here is the output of Team 2 (Medical Researcher): {research}"
    ))
}

/// Scriptwriter input for another round, carrying the rejected script and
/// both evaluations.
pub fn revision_prompt(ctx: &StepContext, george_blackman: &str, mr_beast: &str) -> String {
    let script = ctx.report.get(SCRIPTWRITER).unwrap_or_default();
    let ideation = ctx.report.get(IDEATION_OUTPUT).unwrap_or_default();
    let research = ctx.report.get(RESEARCH_OUTPUT).unwrap_or_default();
    let now = Local::now().format("%Y-%m-%d %H:%M");
    format!(
        "This is the final script that was generated: {script}. \
         Here is the chosen set from output of Team 1 (Ideation Workflow): {ideation}. \
         Here is the output of Team 2 (Medical Researcher): {research}. \
         Current date & time: {now}\n\
         The score given to the final script by george blackman & Mr Beast is as following:\n\
         GEORGE_BLACKMAN_SCORE: {george_blackman}\n\
         MR_BEAST_SCORE: {mr_beast}\n\
         The score wasn't up to mark. Please recreate the script again."
    )
}

/// Joins both evaluations and applies the score gate.
pub struct EvaluateScore {
    services: Arc<Services>,
}

#[async_trait]
impl JoinStep<ScriptingEvent> for EvaluateScore {
    fn name(&self) -> &str {
        "evaluate_score"
    }

    fn expects(&self) -> JoinSpec<ScriptingKind> {
        JoinSpec::new()
            .expect(ScriptingKind::GeorgeBlackmanScored, 1)
            .expect(ScriptingKind::MrBeastScored, 1)
    }

    fn emits(&self) -> Vec<Emits<ScriptingKind>> {
        vec![Emits::LoopBack(ScriptingKind::ScriptRequested), Emits::Stop]
    }

    #[instrument(name = "evaluate_score", skip_all, fields(round = ctx.round))]
    async fn run(
        &self,
        arrivals: Vec<ScriptingEvent>,
        ctx: &StepContext,
    ) -> Result<Emission<ScriptingEvent>, WorkflowError> {
        let mut george_blackman = "";
        let mut mr_beast = "";
        for event in &arrivals {
            match event {
                ScriptingEvent::GeorgeBlackmanScored(t) => george_blackman = t.as_str(),
                ScriptingEvent::MrBeastScored(t) => mr_beast = t.as_str(),
                other => {
                    return Err(WorkflowError::step(
                        self.name(),
                        format!("unexpected arrival {:?}", other.kind()),
                    ));
                }
            }
        }

        let decision = self
            .services
            .gate
            .decide(&[(GEORGE_BLACKMAN, george_blackman), (MR_BEAST, mr_beast)]);
        info!(decision = decision.as_str(), round = ctx.round, "Score gate decision");

        Ok(match decision {
            GateDecision::Approve => Emission::Stop(StopEvent::report(ctx.report.snapshot())),
            GateDecision::Revise => Emission::LoopBack(ScriptingEvent::ScriptRequested(
                revision_prompt(ctx, george_blackman, mr_beast),
            )),
        })
    }
}

/// Build the scripting workflow. Start fields: `ideation` and `research`.
/// Result: the full report.
pub fn scripting_workflow(services: Arc<Services>) -> Result<Workflow<ScriptingEvent>, WorkflowError> {
    Workflow::<ScriptingEvent>::builder("scripting")
        .require("ideation")
        .require("research")
        .timeout(services.timeout)
        .max_revisions(services.max_revisions)
        .step(BriefStep {
            emits: ScriptingKind::ScriptRequested,
            compose: brief,
            wrap: ScriptingEvent::ScriptRequested,
        })
        .step(AgentStage {
            stage: SCRIPTWRITER,
            title: Some("Final Script"),
            accepts: Trigger::Event(ScriptingKind::ScriptRequested),
            emits: vec![
                Emits::Event(ScriptingKind::GeorgeBlackmanReview),
                Emits::Event(ScriptingKind::MrBeastReview),
            ],
            tools: scriptwriter_tools(),
            services: services.clone(),
            compose: |input, _| event_text(input, SCRIPTWRITER, ScriptingEvent::text),
            finish: |script| {
                Emission::Next(vec![
                    ScriptingEvent::GeorgeBlackmanReview(script.clone()),
                    ScriptingEvent::MrBeastReview(script),
                ])
            },
        })
        .step(AgentStage {
            stage: GEORGE_BLACKMAN,
            title: None,
            accepts: Trigger::Event(ScriptingKind::GeorgeBlackmanReview),
            emits: vec![Emits::Event(ScriptingKind::GeorgeBlackmanScored)],
            tools: Default::default(),
            services: services.clone(),
            compose: |input, _| event_text(input, GEORGE_BLACKMAN, ScriptingEvent::text),
            finish: |text| Emission::next(ScriptingEvent::GeorgeBlackmanScored(text)),
        })
        .step(AgentStage {
            stage: MR_BEAST,
            title: None,
            accepts: Trigger::Event(ScriptingKind::MrBeastReview),
            emits: vec![Emits::Event(ScriptingKind::MrBeastScored)],
            tools: Default::default(),
            services: services.clone(),
            compose: |input, _| event_text(input, MR_BEAST, ScriptingEvent::text),
            finish: |text| Emission::next(ScriptingEvent::MrBeastScored(text)),
        })
        .join(EvaluateScore { services })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Report;

    fn ctx() -> StepContext {
        StepContext {
            run_id: "test".into(),
            round: 1,
            report: Report::new(),
            start: Arc::new(StartEvent::new()),
        }
    }

    #[test]
    fn test_brief_stores_inputs_in_report() {
        let ctx = ctx();
        let start = StartEvent::new()
            .with("ideation", "idea set 2")
            .with("research", "three studies");
        let prompt = brief(&start, &ctx).unwrap();
        assert_eq!(ctx.report.get(IDEATION_OUTPUT).as_deref(), Some("idea set 2"));
        assert_eq!(ctx.report.get(RESEARCH_OUTPUT).as_deref(), Some("three studies"));
        assert!(prompt.contains("(Ideation Workflow): idea set 2."));
        assert!(prompt.ends_with("(Medical Researcher): three studies"));
    }

    #[test]
    fn test_revision_prompt_carries_script_and_scores() {
        let ctx = ctx();
        ctx.report.insert(SCRIPTWRITER, "DRAFT ONE");
        ctx.report.insert(IDEATION_OUTPUT, "idea");
        ctx.report.insert(RESEARCH_OUTPUT, "studies");
        let prompt = revision_prompt(&ctx, "Total GB Score: 3/10", "Total MB Score: 8/10");
        assert!(prompt.starts_with("This is the final script that was generated: DRAFT ONE."));
        assert!(prompt.contains("GEORGE_BLACKMAN_SCORE: Total GB Score: 3/10"));
        assert!(prompt.contains("MR_BEAST_SCORE: Total MB Score: 8/10"));
        assert!(prompt.contains("Current date & time: "));
        assert!(prompt.ends_with("Please recreate the script again."));
    }
}
