//! Workflow engine.
//!
//! A workflow is a graph of steps keyed by event kind. Each run starts with
//! the caller's [`StartEvent`], spawns every triggered step as its own task
//! and ends at the first [`StopEvent`]. The whole run is bounded by one
//! wall-clock timeout.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use reelsmith_core::config::{DEFAULT_MAX_REVISIONS, DEFAULT_TIMEOUT_SECS};

use crate::error::WorkflowError;
use crate::event::{Emission, Emits, Input, StartEvent, StopEvent, Trigger, WorkflowEvent, WorkflowOutput};
use crate::join::{Arrival, Rendezvous};
use crate::metrics;
use crate::report::Report;
use crate::step::{JoinStep, Step, StepContext};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub result: WorkflowOutput,
    /// The report as it stood when the run stopped.
    pub report: BTreeMap<String, String>,
    /// Loop-back rounds started (0 when the first pass was accepted).
    pub rounds: u32,
    pub duration: Duration,
}

enum Node<E: WorkflowEvent> {
    Step(Arc<dyn Step<E>>),
    Join(Arc<dyn JoinStep<E>>),
}

impl<E: WorkflowEvent> Node<E> {
    fn name(&self) -> &str {
        match self {
            Self::Step(s) => s.name(),
            Self::Join(j) => j.name(),
        }
    }

    fn emits(&self) -> Vec<Emits<E::Kind>> {
        match self {
            Self::Step(s) => s.emits(),
            Self::Join(j) => j.emits(),
        }
    }
}

enum Task<E: WorkflowEvent> {
    Step(Arc<dyn Step<E>>, Input<E>),
    Join(Arc<dyn JoinStep<E>>, Vec<E>),
}

type TaskResult<E> = (usize, u32, Result<Emission<E>, WorkflowError>);

pub struct WorkflowBuilder<E: WorkflowEvent> {
    name: String,
    nodes: Vec<Node<E>>,
    required: Vec<String>,
    timeout: Duration,
    max_revisions: u32,
}

impl<E: WorkflowEvent> WorkflowBuilder<E> {
    pub fn step(mut self, step: impl Step<E> + 'static) -> Self {
        self.nodes.push(Node::Step(Arc::new(step)));
        self
    }

    pub fn join(mut self, join: impl JoinStep<E> + 'static) -> Self {
        self.nodes.push(Node::Join(Arc::new(join)));
        self
    }

    /// A start field every run must supply as a non-empty string.
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Loop-backs allowed per run before it fails.
    pub fn max_revisions(mut self, max: u32) -> Self {
        self.max_revisions = max;
        self
    }

    /// Build the routing table and check the graph.
    ///
    /// Exactly one step takes the start event; every emitted kind has a
    /// consumer; every consumed kind has a producer; a kind is emitted
    /// forward by at most one step; at least one step can stop the run.
    pub fn build(self) -> Result<Workflow<E>, WorkflowError> {
        let invalid = |msg: String| Err(WorkflowError::InvalidGraph(format!("{}: {msg}", self.name)));

        let mut names = HashSet::new();
        let mut start = None;
        let mut routes: HashMap<E::Kind, Vec<usize>> = HashMap::new();

        for (idx, node) in self.nodes.iter().enumerate() {
            if !names.insert(node.name().to_string()) {
                return invalid(format!("duplicate step name '{}'", node.name()));
            }
            match node {
                Node::Step(step) => match step.accepts() {
                    Trigger::Start => {
                        if let Some(prev) = start.replace(idx) {
                            let prev: &Node<E> = &self.nodes[prev];
                            return invalid(format!(
                                "both '{}' and '{}' accept the start event",
                                prev.name(),
                                node.name()
                            ));
                        }
                    }
                    Trigger::Event(kind) => routes.entry(kind).or_default().push(idx),
                },
                Node::Join(join) => {
                    let spec = join.expects();
                    if spec.is_empty() {
                        return invalid(format!("join '{}' expects no events", node.name()));
                    }
                    for kind in spec.kinds() {
                        routes.entry(kind).or_default().push(idx);
                    }
                }
            }
        }
        let Some(start) = start else {
            return invalid("no step accepts the start event".into());
        };

        let mut producers: HashMap<E::Kind, String> = HashMap::new();
        let mut emitted = HashSet::new();
        let mut can_stop = false;
        for node in &self.nodes {
            for out in node.emits() {
                let kind = match out {
                    Emits::Stop => {
                        can_stop = true;
                        continue;
                    }
                    Emits::Event(kind) => {
                        if let Some(prev) = producers.insert(kind, node.name().to_string()) {
                            return invalid(format!(
                                "{kind:?} is emitted by both '{prev}' and '{}'",
                                node.name()
                            ));
                        }
                        kind
                    }
                    Emits::LoopBack(kind) => kind,
                };
                if !routes.contains_key(&kind) {
                    return invalid(format!(
                        "'{}' emits {kind:?} but no step consumes it",
                        node.name()
                    ));
                }
                emitted.insert(kind);
            }
        }
        if let Some(kind) = routes.keys().find(|k| !emitted.contains(*k)) {
            return invalid(format!("{kind:?} is consumed but never emitted"));
        }
        if !can_stop {
            return invalid("no step emits a stop event".into());
        }

        Ok(Workflow {
            name: self.name,
            nodes: self.nodes,
            start,
            routes,
            required: self.required,
            timeout: self.timeout,
            max_revisions: self.max_revisions,
        })
    }
}

pub struct Workflow<E: WorkflowEvent> {
    name: String,
    nodes: Vec<Node<E>>,
    start: usize,
    routes: HashMap<E::Kind, Vec<usize>>,
    required: Vec<String>,
    timeout: Duration,
    max_revisions: u32,
}

impl<E: WorkflowEvent> Workflow<E> {
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder<E> {
        WorkflowBuilder {
            name: name.into(),
            nodes: Vec::new(),
            required: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_revisions: DEFAULT_MAX_REVISIONS,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one run. Each call gets its own report and join state.
    #[instrument(name = "workflow_run", skip_all, fields(workflow = %self.name, run_id = tracing::field::Empty))]
    pub async fn run(&self, start: StartEvent) -> Result<RunOutcome, WorkflowError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        info!(state = %RunState::Pending, "Workflow run received");

        for field in &self.required {
            if let Err(e) = start.require_str(field) {
                error!(state = %RunState::Failed, error = %e, "Invalid start event");
                return Err(e);
            }
        }

        metrics::record_run_start(&self.name);
        let started = Instant::now();
        let ctx = StepContext {
            run_id: run_id.clone(),
            round: 0,
            report: Report::new(),
            start: Arc::new(start),
        };
        info!(state = %RunState::Running, timeout_secs = self.timeout.as_secs(), "Workflow running");

        let result = match tokio::time::timeout(self.timeout, self.drive(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::Timeout(self.timeout)),
        };

        let duration = started.elapsed();
        match result {
            Ok((stop, rounds)) => {
                info!(
                    state = %RunState::Completed,
                    rounds,
                    duration_ms = duration.as_millis() as u64,
                    "Workflow completed"
                );
                metrics::record_run_complete(&self.name, rounds, duration.as_secs_f64());
                Ok(RunOutcome {
                    run_id,
                    result: stop.result,
                    report: ctx.report.snapshot(),
                    rounds,
                    duration,
                })
            }
            Err(e) => {
                error!(state = %RunState::Failed, error = %e, "Workflow failed");
                metrics::record_run_failed(&self.name, e.kind());
                Err(e)
            }
        }
    }

    /// Drive the graph until a stop event. Dropping the returned future
    /// (on timeout) drops the task set, which aborts every running step.
    async fn drive(&self, base: &StepContext) -> Result<(StopEvent, u32), WorkflowError> {
        let mut tasks: JoinSet<TaskResult<E>> = JoinSet::new();
        let mut joins: HashMap<usize, Rendezvous<E>> = HashMap::new();
        let mut rounds = 0u32;

        let Node::Step(start_step) = &self.nodes[self.start] else {
            return Err(WorkflowError::InvalidGraph("start node is a join".into()));
        };
        self.spawn(
            &mut tasks,
            self.start,
            Task::Step(start_step.clone(), Input::Start(base.start.clone())),
            base.for_round(0),
        );

        while let Some(joined) = tasks.join_next().await {
            let (idx, round, result) = joined.map_err(|e| WorkflowError::Join(e.to_string()))?;
            let node = &self.nodes[idx];
            let emission = result?;

            match emission {
                Emission::Next(events) => {
                    if events.is_empty() {
                        debug!(step = node.name(), "Branch ended without output");
                    }
                    for event in events {
                        self.check_declared(node, Emits::Event(event.kind()))?;
                        self.dispatch(event, round, base, &mut tasks, &mut joins);
                    }
                }
                Emission::LoopBack(event) => {
                    self.check_declared(node, Emits::LoopBack(event.kind()))?;
                    let next = round + 1;
                    if next > self.max_revisions {
                        warn!(step = node.name(), max = self.max_revisions, "Loop-back limit reached");
                        return Err(WorkflowError::LoopBoundExceeded {
                            max: self.max_revisions,
                        });
                    }
                    rounds = rounds.max(next);
                    info!(step = node.name(), round = next, kind = ?event.kind(), "Loop-back, starting new round");
                    self.dispatch(event, next, base, &mut tasks, &mut joins);
                }
                Emission::Stop(stop) => {
                    self.check_declared(node, Emits::Stop)?;
                    if !tasks.is_empty() {
                        debug!(pending = tasks.len(), "Stop event received, aborting remaining steps");
                    }
                    tasks.abort_all();
                    return Ok((stop, rounds));
                }
            }
        }

        Err(WorkflowError::Stalled)
    }

    fn check_declared(&self, node: &Node<E>, out: Emits<E::Kind>) -> Result<(), WorkflowError> {
        if node.emits().contains(&out) {
            Ok(())
        } else {
            Err(WorkflowError::step(
                node.name(),
                format!("emitted undeclared output {out:?}"),
            ))
        }
    }

    /// Route `event` to every consumer of its kind.
    fn dispatch(
        &self,
        event: E,
        round: u32,
        base: &StepContext,
        tasks: &mut JoinSet<TaskResult<E>>,
        joins: &mut HashMap<usize, Rendezvous<E>>,
    ) {
        let kind = event.kind();
        let consumers = self.routes.get(&kind).map(Vec::as_slice).unwrap_or_default();
        for &idx in consumers {
            match &self.nodes[idx] {
                Node::Step(step) => {
                    debug!(step = step.name(), ?kind, round, "Dispatching event");
                    self.spawn(
                        tasks,
                        idx,
                        Task::Step(step.clone(), Input::Event(event.clone())),
                        base.for_round(round),
                    );
                }
                Node::Join(join) => {
                    let rendezvous = joins
                        .entry(idx)
                        .or_insert_with(|| Rendezvous::new(join.expects()));
                    match rendezvous.arrive(round, event.clone()) {
                        Arrival::Pending => {
                            debug!(join = join.name(), ?kind, round, "Join waiting for more arrivals");
                        }
                        Arrival::Ready(arrivals) => {
                            debug!(join = join.name(), round, "Join complete");
                            self.spawn(
                                tasks,
                                idx,
                                Task::Join(join.clone(), arrivals),
                                base.for_round(round),
                            );
                        }
                        Arrival::Stale => {
                            warn!(join = join.name(), ?kind, round, current = rendezvous.round(), "Ignoring stale join arrival");
                        }
                    }
                }
            }
        }
    }

    fn spawn(&self, tasks: &mut JoinSet<TaskResult<E>>, idx: usize, task: Task<E>, ctx: StepContext) {
        tasks.spawn(async move {
            let started = Instant::now();
            let (name, result) = match task {
                Task::Step(step, input) => {
                    let result = step.run(input, &ctx).await;
                    (step.name().to_string(), result)
                }
                Task::Join(join, arrivals) => {
                    let result = join.run(arrivals, &ctx).await;
                    (join.name().to_string(), result)
                }
            };
            metrics::record_step(&name, started.elapsed().as_secs_f64(), result.is_ok());
            (idx, ctx.round, result)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::join::JoinSpec;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Drafted(u32),
        Left(u32),
        Right(u32),
        Orphan,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Drafted,
        Left,
        Right,
        Orphan,
    }

    impl WorkflowEvent for Ev {
        type Kind = Kind;
        fn kind(&self) -> Kind {
            match self {
                Ev::Drafted(_) => Kind::Drafted,
                Ev::Left(_) => Kind::Left,
                Ev::Right(_) => Kind::Right,
                Ev::Orphan => Kind::Orphan,
            }
        }
    }

    /// Start -> Drafted, Drafted -> [Left, Right].
    struct Draft;

    #[async_trait]
    impl Step<Ev> for Draft {
        fn name(&self) -> &str {
            "draft"
        }
        fn accepts(&self) -> Trigger<Kind> {
            Trigger::Start
        }
        fn emits(&self) -> Vec<Emits<Kind>> {
            vec![Emits::Event(Kind::Drafted)]
        }
        async fn run(&self, _input: Input<Ev>, ctx: &StepContext) -> Result<Emission<Ev>, WorkflowError> {
            ctx.report.insert("draft", format!("round {}", ctx.round));
            Ok(Emission::next(Ev::Drafted(ctx.round)))
        }
    }

    struct Split;

    #[async_trait]
    impl Step<Ev> for Split {
        fn name(&self) -> &str {
            "split"
        }
        fn accepts(&self) -> Trigger<Kind> {
            Trigger::Event(Kind::Drafted)
        }
        fn emits(&self) -> Vec<Emits<Kind>> {
            vec![Emits::Event(Kind::Left), Emits::Event(Kind::Right)]
        }
        async fn run(&self, input: Input<Ev>, _ctx: &StepContext) -> Result<Emission<Ev>, WorkflowError> {
            let Some(Ev::Drafted(n)) = input.event() else {
                return Err(WorkflowError::step("split", "bad input"));
            };
            Ok(Emission::Next(vec![Ev::Left(*n), Ev::Right(*n)]))
        }
    }

    /// Loops back until the configured number of passes has been seen.
    struct Gate {
        approve_at_round: u32,
    }

    #[async_trait]
    impl JoinStep<Ev> for Gate {
        fn name(&self) -> &str {
            "gate"
        }
        fn expects(&self) -> JoinSpec<Kind> {
            JoinSpec::new().expect(Kind::Left, 1).expect(Kind::Right, 1)
        }
        fn emits(&self) -> Vec<Emits<Kind>> {
            vec![Emits::LoopBack(Kind::Drafted), Emits::Stop]
        }
        async fn run(&self, arrivals: Vec<Ev>, ctx: &StepContext) -> Result<Emission<Ev>, WorkflowError> {
            assert_eq!(arrivals.len(), 2);
            if ctx.round >= self.approve_at_round {
                Ok(Emission::Stop(StopEvent::report(ctx.report.snapshot())))
            } else {
                Ok(Emission::LoopBack(Ev::Drafted(ctx.round + 1)))
            }
        }
    }

    fn graph(approve_at_round: u32, max_revisions: u32) -> Workflow<Ev> {
        Workflow::builder("test")
            .step(Draft)
            .step(Split)
            .join(Gate { approve_at_round })
            .max_revisions(max_revisions)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_join_stop() {
        let outcome = graph(0, 3).run(StartEvent::new()).await.unwrap();
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.report["draft"], "round 0");
        assert!(matches!(outcome.result, WorkflowOutput::Report(_)));
    }

    #[tokio::test]
    async fn test_loop_back_rounds() {
        let outcome = graph(2, 3).run(StartEvent::new()).await.unwrap();
        assert_eq!(outcome.rounds, 2);
    }

    #[tokio::test]
    async fn test_loop_bound() {
        let err = graph(10, 2).run(StartEvent::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::LoopBoundExceeded { max: 2 }));
    }

    #[tokio::test]
    async fn test_required_start_field() {
        let wf = Workflow::builder("test")
            .step(Draft)
            .step(Split)
            .join(Gate { approve_at_round: 0 })
            .require("input")
            .build()
            .unwrap();
        let err = wf.run(StartEvent::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MissingStartField(f) if f == "input"));
    }

    #[test]
    fn test_graph_without_start_is_invalid() {
        let err = Workflow::<Ev>::builder("test")
            .step(Split)
            .join(Gate { approve_at_round: 0 })
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("start event"));
    }

    #[test]
    fn test_unconsumed_emission_is_invalid() {
        let err = Workflow::<Ev>::builder("test")
            .step(Draft)
            .step(Split)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("no step consumes"));
    }

    struct Dangling;

    #[async_trait]
    impl Step<Ev> for Dangling {
        fn name(&self) -> &str {
            "dangling"
        }
        fn accepts(&self) -> Trigger<Kind> {
            Trigger::Event(Kind::Orphan)
        }
        fn emits(&self) -> Vec<Emits<Kind>> {
            vec![Emits::Stop]
        }
        async fn run(&self, _input: Input<Ev>, _ctx: &StepContext) -> Result<Emission<Ev>, WorkflowError> {
            Ok(Emission::Stop(StopEvent::text("never")))
        }
    }

    #[test]
    fn test_unreachable_step_is_invalid() {
        let err = Workflow::<Ev>::builder("test")
            .step(Draft)
            .step(Split)
            .join(Gate { approve_at_round: 0 })
            .step(Dangling)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("never emitted"));
    }

    #[test]
    fn test_duplicate_names_are_invalid() {
        let err = Workflow::<Ev>::builder("test")
            .step(Draft)
            .step(Draft)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("duplicate"));
    }

    struct Silent;

    #[async_trait]
    impl Step<Ev> for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        fn accepts(&self) -> Trigger<Kind> {
            Trigger::Start
        }
        fn emits(&self) -> Vec<Emits<Kind>> {
            vec![Emits::Stop]
        }
        async fn run(&self, _input: Input<Ev>, _ctx: &StepContext) -> Result<Emission<Ev>, WorkflowError> {
            Ok(Emission::Next(vec![]))
        }
    }

    #[tokio::test]
    async fn test_run_without_stop_stalls() {
        let wf = Workflow::<Ev>::builder("test").step(Silent).build().unwrap();
        let err = wf.run(StartEvent::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Stalled));
    }
}
