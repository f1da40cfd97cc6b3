//! One-shot script edits outside the workflow engine.

use tracing::{info, instrument};

use crate::error::WorkflowError;
use crate::prompts::SCRIPT_MODIFICATION;
use crate::stage::Services;

use super::editor_tools;

pub fn modification_prompt(script: &str, request: &str) -> String {
    format!("The script is:{script}. The modification request is: {request}")
}

/// Apply `request` to `script` in a single agent turn and return the
/// revised script. Bounded by the workflow timeout.
#[instrument(skip_all, fields(script_chars = script.len()))]
pub async fn modify_script(
    services: &Services,
    script: &str,
    request: &str,
) -> Result<String, WorkflowError> {
    if script.trim().is_empty() {
        return Err(WorkflowError::MissingStartField("script".into()));
    }
    if request.trim().is_empty() {
        return Err(WorkflowError::MissingStartField("input".into()));
    }

    let system = services.prompts.system(SCRIPT_MODIFICATION);
    let prompt = modification_prompt(script, request);
    let tools = editor_tools();
    let turn = services.agent.invoke(&system, &tools, &prompt, &[]);

    let reply = tokio::time::timeout(services.timeout, turn)
        .await
        .map_err(|_| WorkflowError::Timeout(services.timeout))??;
    info!(chars = reply.text.len(), tool_calls = reply.tool_calls, "Script modified");
    Ok(reply.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modification_prompt() {
        assert_eq!(
            modification_prompt("INTRO...", "shorter hook"),
            "The script is:INTRO.... The modification request is: shorter hook"
        );
    }
}
