//! Collector states and pass planning

/// State of the incremental collector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CollectorState {
    /// No pass in progress
    #[default]
    Default,
    /// Snapshot taken, propagating liveness
    Marking,
    /// Fixed point reached and host worklists drained, ready to verify
    GarbageMarking,
    /// The next step is a pure non-cyclic sweep without a snapshot
    Garbage,
}

impl CollectorState {
    /// Whether a snapshot is alive in this state
    #[inline]
    pub fn has_snapshot(self) -> bool {
        matches!(self, CollectorState::Marking | CollectorState::GarbageMarking)
    }
}

/// Work done by one invocation of the entry point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Border marking from raw refcounts, no cycle detection
    Sweep,
    /// Merge new objects, take the snapshot, collect roots
    Snapshot,
    /// Liveness propagation
    Mark,
    /// Verify, hand off dead objects, border marking
    Finish,
}

/// Decide what the entry point does next.
pub(crate) const fn plan(state: CollectorState, cycle_enabled: bool) -> Step {
    match state {
        CollectorState::Garbage => Step::Sweep,
        CollectorState::Default if !cycle_enabled => Step::Sweep,
        CollectorState::Default => Step::Snapshot,
        CollectorState::Marking => Step::Mark,
        CollectorState::GarbageMarking => Step::Finish,
    }
}

/// How the last completed pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Sweep without cycle detection
    Swept,
    /// Cycle detection ran and the graph was consistent
    Collected {
        /// Dead objects handed back to the foreign runtime
        released: usize,
        /// Dead objects waiting for finalizers
        isolated: usize,
        /// Dead objects with legacy finalizers, kept alive
        legacy: usize,
    },
    /// The graph changed during the pass, nothing was collected
    Resurrected,
}
