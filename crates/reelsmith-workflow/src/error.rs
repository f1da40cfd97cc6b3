//! Workflow errors.

use std::time::Duration;

use reelsmith_agent::AgentError;

/// Errors that fail a workflow run.
///
/// Tool failures and unparseable evaluator scores never appear here; they
/// are absorbed by the agent loop and the score gate respectively.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow timed out after {0:?}")]
    Timeout(Duration),

    #[error("loop-back limit of {max} revisions exceeded")]
    LoopBoundExceeded { max: u32 },

    #[error("start event is missing required field '{0}'")]
    MissingStartField(String),

    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("step '{step}' failed: {message}")]
    Step { step: String, message: String },

    /// A step task panicked or was aborted.
    #[error("step task failed: {0}")]
    Join(String),

    /// Every branch finished without any step emitting a stop event.
    #[error("workflow stalled: no pending steps and no stop event")]
    Stalled,
}

impl WorkflowError {
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::LoopBoundExceeded { .. } => "loop_bound_exceeded",
            Self::MissingStartField(_) => "missing_start_field",
            Self::InvalidGraph(_) => "invalid_graph",
            Self::Agent(AgentError::ModelUnavailable(_)) => "model_unavailable",
            Self::Agent(AgentError::ToolLoopExceeded { .. }) => "tool_loop_exceeded",
            Self::Agent(AgentError::EmptyInput) => "empty_input",
            Self::Step { .. } => "step",
            Self::Join(_) => "join",
            Self::Stalled => "stalled",
        }
    }
}
