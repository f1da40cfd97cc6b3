//! Agent invoker: one conversational turn with a bound model and tool set.
//!
//! The invoker sends the input (plus any prior chat history) to the model,
//! runs the tool calls the model asks for, feeds the results back and
//! repeats until the model answers without a tool call. Only the final text
//! is returned; the tool-call transcript stays inside the turn.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use reelsmith_core::transcript::Usage;
use reelsmith_providers::ProviderError;

pub mod runtime;

pub use runtime::AgentInvoker;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The model endpoint failed after its retry budget.
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] ProviderError),

    #[error("tool-call loop exceeded {rounds} rounds")]
    ToolLoopExceeded { rounds: u32 },

    #[error("agent input is empty")]
    EmptyInput,
}

/// Result of a completed agent turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReply {
    /// The model's last completion text.
    pub text: String,
    /// Tokens summed over every completion in the turn.
    pub usage: Usage,
    pub tool_calls: u32,
}
