//! Workflow metrics recording.

/// Record a run starting.
pub fn record_run_start(workflow: &str) {
    let labels = [("workflow", workflow.to_string())];
    metrics::counter!("reelsmith_workflow_runs_started_total", &labels).increment(1);
    metrics::gauge!("reelsmith_workflow_runs_active", &labels).increment(1.0);
}

/// Record a run reaching its stop event.
pub fn record_run_complete(workflow: &str, rounds: u32, duration_secs: f64) {
    let labels = [("workflow", workflow.to_string())];
    metrics::gauge!("reelsmith_workflow_runs_active", &labels).decrement(1.0);
    metrics::counter!("reelsmith_workflow_runs_completed_total", &labels).increment(1);
    metrics::histogram!("reelsmith_workflow_rounds", &labels).record(f64::from(rounds));
    metrics::histogram!("reelsmith_workflow_duration_seconds", &labels).record(duration_secs);
}

/// Record a failed run, labelled by failure kind.
pub fn record_run_failed(workflow: &str, kind: &'static str) {
    metrics::gauge!("reelsmith_workflow_runs_active", "workflow" => workflow.to_string()).decrement(1.0);
    let labels = [("workflow", workflow.to_string()), ("kind", kind.to_string())];
    metrics::counter!("reelsmith_workflow_runs_failed_total", &labels).increment(1);
}

/// Record one step execution.
pub fn record_step(step: &str, duration_secs: f64, ok: bool) {
    let labels = [
        ("step", step.to_string()),
        ("outcome", if ok { "ok" } else { "error" }.to_string()),
    ];
    metrics::histogram!("reelsmith_step_duration_seconds", &labels).record(duration_secs);
}

/// Record a score-gate decision ("approve" or "revise").
pub fn record_gate_decision(decision: &'static str) {
    metrics::counter!("reelsmith_gate_decisions_total", "decision" => decision).increment(1);
}
