//! Round-tagged rendezvous for fan-in steps.
//!
//! Arrivals carry the round they were produced in. A rendezvous collects one
//! round at a time: an arrival from a later round discards the partial
//! collection, arrivals from earlier rounds and surplus arrivals after the
//! join fired are reported as stale.

use tracing::debug;

use crate::event::WorkflowEvent;

/// Event kinds a join waits for, with the number of each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec<K> {
    expected: Vec<(K, usize)>,
}

impl<K: Copy + Eq> Default for JoinSpec<K> {
    fn default() -> Self {
        Self {
            expected: Vec::new(),
        }
    }
}

impl<K: Copy + Eq> JoinSpec<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `count` events of `kind`. Repeated calls for one kind add up.
    pub fn expect(mut self, kind: K, count: usize) -> Self {
        match self.expected.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, n)) => *n += count,
            None => self.expected.push((kind, count)),
        }
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = K> + '_ {
        self.expected.iter().map(|(k, _)| *k)
    }

    pub fn count(&self, kind: K) -> usize {
        self.expected
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.expected.iter().map(|(_, n)| n).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug)]
pub enum Arrival<E> {
    /// Recorded; still waiting on other arrivals.
    Pending,
    /// The round is complete. Carries every arrival, in order.
    Ready(Vec<E>),
    /// From an older round, or surplus to the current one. Ignored.
    Stale,
}

#[derive(Debug)]
pub struct Rendezvous<E: WorkflowEvent> {
    spec: JoinSpec<E::Kind>,
    round: u32,
    arrived: Vec<E>,
    fired: bool,
}

impl<E: WorkflowEvent> Rendezvous<E> {
    pub fn new(spec: JoinSpec<E::Kind>) -> Self {
        Self {
            spec,
            round: 0,
            arrived: Vec::new(),
            fired: false,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn arrive(&mut self, round: u32, event: E) -> Arrival<E> {
        if round < self.round {
            return Arrival::Stale;
        }
        if round > self.round {
            if !self.arrived.is_empty() {
                debug!(
                    from = self.round,
                    to = round,
                    dropped = self.arrived.len(),
                    "Join moved to a new round"
                );
            }
            self.round = round;
            self.arrived.clear();
            self.fired = false;
        }
        if self.fired {
            return Arrival::Stale;
        }

        let kind = event.kind();
        let have = self.arrived.iter().filter(|e| e.kind() == kind).count();
        if have >= self.spec.count(kind) {
            return Arrival::Stale;
        }
        self.arrived.push(event);

        if self.arrived.len() == self.spec.total() {
            self.fired = true;
            Arrival::Ready(std::mem::take(&mut self.arrived))
        } else {
            Arrival::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        A(u32),
        B(u32),
        C,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
        C,
    }

    impl WorkflowEvent for Ev {
        type Kind = Kind;
        fn kind(&self) -> Kind {
            match self {
                Ev::A(_) => Kind::A,
                Ev::B(_) => Kind::B,
                Ev::C => Kind::C,
            }
        }
    }

    fn pair() -> Rendezvous<Ev> {
        Rendezvous::new(JoinSpec::new().expect(Kind::A, 1).expect(Kind::B, 1))
    }

    #[test]
    fn test_fires_once_when_all_arrive() {
        let mut rv = pair();
        assert!(matches!(rv.arrive(0, Ev::A(1)), Arrival::Pending));
        match rv.arrive(0, Ev::B(1)) {
            Arrival::Ready(events) => assert_eq!(events, vec![Ev::A(1), Ev::B(1)]),
            other => panic!("expected ready, got {other:?}"),
        }
        // Surplus arrival in the same round is not re-processed.
        assert!(matches!(rv.arrive(0, Ev::A(2)), Arrival::Stale));
    }

    #[test]
    fn test_duplicate_kind_does_not_complete() {
        let mut rv = pair();
        assert!(matches!(rv.arrive(0, Ev::A(1)), Arrival::Pending));
        assert!(matches!(rv.arrive(0, Ev::A(2)), Arrival::Stale));
        assert!(matches!(rv.arrive(0, Ev::B(1)), Arrival::Ready(_)));
    }

    #[test]
    fn test_unexpected_kind_is_stale() {
        let mut rv = pair();
        assert!(matches!(rv.arrive(0, Ev::C), Arrival::Stale));
    }

    #[test]
    fn test_new_round_after_loop_back() {
        let mut rv = pair();
        rv.arrive(0, Ev::A(1));
        assert!(matches!(rv.arrive(0, Ev::B(1)), Arrival::Ready(_)));

        assert!(matches!(rv.arrive(1, Ev::B(2)), Arrival::Pending));
        // A late arrival from round 0 does not complete round 1.
        assert!(matches!(rv.arrive(0, Ev::A(9)), Arrival::Stale));
        match rv.arrive(1, Ev::A(2)) {
            Arrival::Ready(events) => assert_eq!(events, vec![Ev::B(2), Ev::A(2)]),
            other => panic!("expected ready, got {other:?}"),
        }
        assert_eq!(rv.round(), 1);
    }

    #[test]
    fn test_partial_round_discarded_by_newer_round() {
        let mut rv = pair();
        rv.arrive(0, Ev::A(1));
        assert!(matches!(rv.arrive(1, Ev::B(2)), Arrival::Pending));
        assert!(matches!(rv.arrive(1, Ev::A(2)), Arrival::Ready(ref e) if e.len() == 2));
    }

    #[test]
    fn test_counts_add_up() {
        let spec = JoinSpec::new().expect(Kind::A, 2).expect(Kind::A, 1);
        assert_eq!(spec.count(Kind::A), 3);
        assert_eq!(spec.total(), 3);
        assert!(JoinSpec::<Kind>::new().is_empty());
    }
}
