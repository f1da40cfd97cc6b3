//! Events routed between steps.
//!
//! Each workflow declares one enum of intermediate events. Routing is keyed
//! on the event's [`WorkflowEvent::Kind`], a fieldless discriminator, so the
//! graph can be checked when the workflow is built.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WorkflowError;

/// An intermediate event type.
pub trait WorkflowEvent: Clone + Debug + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Caller-supplied payload that starts a run: named fields such as `input`,
/// `chat_history` or the output of an earlier workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartEvent {
    fields: Map<String, Value>,
}

impl StartEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A string field, if present and non-empty.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn require_str(&self, key: &str) -> Result<&str, WorkflowError> {
        self.get_str(key)
            .ok_or_else(|| WorkflowError::MissingStartField(key.to_string()))
    }
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowOutput {
    Text(String),
    /// The whole report, stage name to stage result.
    Report(BTreeMap<String, String>),
}

impl WorkflowOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Report(_) => None,
        }
    }
}

/// Terminal event. The first one emitted ends the run.
#[derive(Debug, Clone, PartialEq)]
pub struct StopEvent {
    pub result: WorkflowOutput,
}

impl StopEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            result: WorkflowOutput::Text(text.into()),
        }
    }

    pub fn report(report: BTreeMap<String, String>) -> Self {
        Self {
            result: WorkflowOutput::Report(report),
        }
    }
}

/// What a step receives.
#[derive(Debug, Clone)]
pub enum Input<E> {
    Start(Arc<StartEvent>),
    Event(E),
}

impl<E> Input<E> {
    pub fn event(&self) -> Option<&E> {
        match self {
            Self::Event(e) => Some(e),
            Self::Start(_) => None,
        }
    }
}

/// What a step produces.
#[derive(Debug, Clone)]
pub enum Emission<E> {
    /// Continue in the current round. More than one event fans out into
    /// parallel branches.
    Next(Vec<E>),
    /// Re-enter an earlier stage. Starts a new round.
    LoopBack(E),
    Stop(StopEvent),
}

impl<E> Emission<E> {
    pub fn next(event: E) -> Self {
        Self::Next(vec![event])
    }
}

/// The event a step is triggered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger<K> {
    Start,
    Event(K),
}

/// A declared output of a step, used to check the graph at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emits<K> {
    Event(K),
    LoopBack(K),
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let start = StartEvent::new().with("input", "sugar").with("blank", "  ");
        assert_eq!(start.require_str("input").unwrap(), "sugar");
        assert!(matches!(
            start.require_str("blank"),
            Err(WorkflowError::MissingStartField(f)) if f == "blank"
        ));
        assert!(start.require_str("ideation").is_err());
    }

    #[test]
    fn test_start_event_from_json() {
        let start: StartEvent =
            serde_json::from_value(json!({"input": "sugar", "chat_history": ""})).unwrap();
        assert_eq!(start.get_str("input"), Some("sugar"));
        assert_eq!(start.get_str("chat_history"), None);
    }

    #[test]
    fn test_output_serializes_untagged() {
        let text = serde_json::to_value(WorkflowOutput::Text("done".into())).unwrap();
        assert_eq!(text, json!("done"));
        let mut map = BTreeMap::new();
        map.insert("SEO_Analysis".to_string(), "ok".to_string());
        let report = serde_json::to_value(WorkflowOutput::Report(map)).unwrap();
        assert_eq!(report["SEO_Analysis"], "ok");
    }
}
