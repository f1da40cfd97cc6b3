//! Score gate: approve a draft or send it back for revision.
//!
//! Evaluators answer in free text. The total is read from the first line of
//! the form `Total Score: 7/10` in any letter case (a one-word qualifier such
//! as `Total MB Score:` is accepted) and normalised to a 10-point scale.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use reelsmith_core::config::{Config, DEFAULT_SCORE_THRESHOLD, UnparsedScorePolicy};

use crate::metrics;

static TOTAL_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Total(?:\s+\w+)?\s+Score:[\s*]*([0-9]+(?:\.[0-9]+)?)\s*/\s*([0-9]+(?:\.[0-9]+)?)")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub value: f64,
    pub scale: f64,
}

impl Score {
    /// The score on a 10-point scale.
    pub fn out_of_ten(&self) -> f64 {
        self.value / self.scale * 10.0
    }
}

/// Find the total score in an evaluator's answer. `None` when there is no
/// score line or the numbers are unusable.
pub fn parse_total_score(text: &str) -> Option<Score> {
    let caps = TOTAL_SCORE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let scale: f64 = caps[2].parse().ok()?;
    if scale <= 0.0 || !value.is_finite() || !scale.is_finite() {
        return None;
    }
    Some(Score { value, scale })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approve,
    Revise,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Revise => "revise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreGate {
    /// A score at or below this (out of 10) sends the draft back.
    pub threshold: f64,
    pub unparsed: UnparsedScorePolicy,
}

impl Default for ScoreGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCORE_THRESHOLD,
            unparsed: UnparsedScorePolicy::default(),
        }
    }
}

impl ScoreGate {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.score_threshold(),
            unparsed: config.unparsed_score_policy(),
        }
    }

    /// Decide on `(evaluator, answer)` pairs. Any failing evaluator means
    /// revise.
    pub fn decide(&self, evaluations: &[(&str, &str)]) -> GateDecision {
        let mut decision = GateDecision::Approve;
        for (evaluator, answer) in evaluations {
            let passed = match parse_total_score(answer) {
                Some(score) => {
                    let total = score.out_of_ten();
                    info!(evaluator, total, threshold = self.threshold, "Evaluator score");
                    total > self.threshold
                }
                None => {
                    warn!(
                        evaluator,
                        policy = ?self.unparsed,
                        "No parseable total score in evaluator answer"
                    );
                    self.unparsed == UnparsedScorePolicy::Pass
                }
            };
            if !passed {
                decision = GateDecision::Revise;
            }
        }
        metrics::record_gate_decision(decision.as_str());
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_qualified_labels() {
        assert_eq!(
            parse_total_score("Hook: 3/3\nTotal Score: 8/10"),
            Some(Score { value: 8.0, scale: 10.0 })
        );
        assert_eq!(
            parse_total_score("Total MB Score: 4.5 / 10").map(|s| s.value),
            Some(4.5)
        );
        assert_eq!(
            parse_total_score("**Total GB Score:** 75/100").map(|s| s.out_of_ten()),
            Some(7.5)
        );
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_total_score("Great script, no notes."), None);
        assert_eq!(parse_total_score("Total Score: excellent"), None);
        assert_eq!(parse_total_score("Total Score: 5/0"), None);
    }

    #[test]
    fn test_parse_ignores_label_case() {
        assert_eq!(parse_total_score("TOTAL SCORE: 2/10").map(|s| s.value), Some(2.0));
        assert_eq!(parse_total_score("total mb score: 6/10").map(|s| s.value), Some(6.0));
        let gate = ScoreGate::default();
        assert_eq!(
            gate.decide(&[("gb", "TOTAL SCORE: 2/10"), ("mb", "Total Score: 9/10")]),
            GateDecision::Revise
        );
    }

    #[test]
    fn test_first_score_line_wins() {
        let text = "Total Score: 9/10\n...\nTotal Score: 2/10";
        assert_eq!(parse_total_score(text).map(|s| s.value), Some(9.0));
    }

    #[test]
    fn test_decide_approves_when_both_above() {
        let gate = ScoreGate::default();
        let d = gate.decide(&[("gb", "Total Score: 8/10"), ("mb", "Total Score: 9/10")]);
        assert_eq!(d, GateDecision::Approve);
    }

    #[test]
    fn test_decide_revises_when_either_at_or_below() {
        let gate = ScoreGate::default();
        assert_eq!(
            gate.decide(&[("gb", "Total Score: 8/10"), ("mb", "Total Score: 3/10")]),
            GateDecision::Revise
        );
        assert_eq!(
            gate.decide(&[("gb", "Total Score: 5/10"), ("mb", "Total Score: 9/10")]),
            GateDecision::Revise
        );
    }

    #[test]
    fn test_unparsed_follows_policy() {
        let pass = ScoreGate::default();
        assert_eq!(
            pass.decide(&[("gb", "no score"), ("mb", "Total Score: 9/10")]),
            GateDecision::Approve
        );

        let fail = ScoreGate {
            unparsed: UnparsedScorePolicy::Fail,
            ..ScoreGate::default()
        };
        assert_eq!(
            fail.decide(&[("gb", "no score"), ("mb", "Total Score: 9/10")]),
            GateDecision::Revise
        );
    }
}
