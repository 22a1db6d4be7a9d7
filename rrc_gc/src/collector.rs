//! Collector - the incremental cycle detection state machine
//!
//! Design:
//! - Driven by the host GC's major collection, one `trace_step` at a time
//! - Each step does the work of the current state and advances at most one transition
//! - A snapshot is taken when a pass starts and dropped when it finishes
//! - Program execution may run between two steps; the verifier catches changes
//!
//! The runtime provides:
//! - `ForeignRuntime` - refcounts, bridge links, traversal, finalizer kinds
//! - `HostGc` - visited flags and the pending-trace worklist

use alloc::vec::Vec;

use tracing::debug;

use crate::{
    context::{ForeignRuntime, HostGc},
    error::{TrackError, TrackResult},
    marker::{MarkProgress, Marker},
    object::{strip_host_bias, FinalizerKind, ObjectId},
    options::Options,
    snapshot::Snapshot,
    state::{plan, CollectorState, PassOutcome, Step},
    stats::Stats,
    tracked::{SetKind, TrackedSets},
    verify::{verify, Verdict},
};

/// The cross-domain cycle collector
pub struct Collector {
    options: Options,

    /// Current state, only changed by `trace_step` (and `request_sweep_only` while idle)
    state: CollectorState,

    /// New, in-collection, isolated and staged objects
    sets: TrackedSets,

    /// Present exactly while the state is `Marking` or `GarbageMarking`
    snapshot: Option<Snapshot>,

    /// An object of the active snapshot stopped being tracked
    snapshot_invalidated: bool,

    stats: Stats,

    last_outcome: Option<PassOutcome>,
}

impl Collector {
    /// Create a new collector
    pub fn new(options: Options) -> Collector {
        Collector {
            options,
            state: CollectorState::Default,
            sets: TrackedSets::new(),
            snapshot: None,
            snapshot_invalidated: false,
            stats: Stats::default(),
            last_outcome: None,
        }
    }

    #[inline]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    #[inline]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// How the last completed pass ended
    #[inline]
    pub fn last_outcome(&self) -> Option<PassOutcome> {
        self.last_outcome
    }

    /// Check if a pass is in progress
    #[inline]
    pub fn pass_in_progress(&self) -> bool {
        self.state.has_snapshot()
    }

    /// The snapshot of the pass in progress
    #[inline]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Enable or disable cycle detection for the following passes
    pub fn set_cycle_enabled(&mut self, cycle_enabled: bool) {
        self.options.cycle_enabled = cycle_enabled;
    }

    /// Make the next step a plain sweep without cycle detection.
    ///
    /// Ignored while a pass is in progress, passes cannot be cancelled.
    pub fn request_sweep_only(&mut self) {
        if self.state == CollectorState::Default {
            self.state = CollectorState::Garbage;
        } else {
            debug!(state = ?self.state, "sweep-only request ignored");
        }
    }

    // ========================================================================
    // Tracked-set management
    // ========================================================================

    /// Start tracking a newly created foreign object
    pub fn track(&mut self, obj: ObjectId) -> TrackResult<()> {
        if self.sets.insert(obj, SetKind::New) {
            Ok(())
        } else {
            Err(TrackError::AlreadyTracked(obj))
        }
    }

    /// Stop tracking an object, usually because the foreign runtime freed it.
    ///
    /// Untracking an object that is part of the active snapshot keeps the
    /// whole pass alive.
    pub fn untrack(&mut self, obj: ObjectId) -> TrackResult<()> {
        if self.sets.remove(obj).is_none() {
            return Err(TrackError::NotTracked(obj));
        }

        if let Some(snapshot) = &self.snapshot {
            if snapshot.index_of(obj).is_some() {
                debug!(object = %obj, "snapshot object untracked during pass");
                self.snapshot_invalidated = true;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_tracked(&self, obj: ObjectId) -> bool {
        self.sets.contains(obj)
    }

    /// The set `obj` currently belongs to
    #[inline]
    pub fn set_of(&self, obj: ObjectId) -> Option<SetKind> {
        self.sets.set_of(obj)
    }

    /// Members of `set`, in order
    pub fn tracked_in(&self, set: SetKind) -> impl Iterator<Item = ObjectId> + '_ {
        self.sets.iter(set)
    }

    /// Cyclic refcount left by the last pass, > 0 means alive
    #[inline]
    pub fn cyclic_refcount(&self, obj: ObjectId) -> Option<usize> {
        self.sets.gc_refs(obj)
    }

    #[inline]
    pub fn tracked_sets(&self) -> &TrackedSets {
        &self.sets
    }

    /// The finalizer of an isolated object has run. It is reprocessed by the
    /// next pass like a new object.
    pub fn finalizers_done(&mut self, obj: ObjectId) -> TrackResult<()> {
        match self.sets.set_of(obj) {
            Some(SetKind::Isolated) => {
                self.sets.move_to(obj, SetKind::New);
                self.sets.set_gc_refs(obj, 1);
                Ok(())
            }
            Some(_) => Err(TrackError::NotIsolated(obj)),
            None => Err(TrackError::NotTracked(obj)),
        }
    }

    // ========================================================================
    // Incremental collection API
    // ========================================================================

    /// Advance the collector by one step.
    ///
    /// Returns true when the pass is finished: after a sweep, or after dead
    /// objects were handed off. Returns false while a pass is in progress.
    ///
    /// # Example
    /// ```ignore
    /// // Called from the host GC's incremental marking loop
    /// while !collector.trace_step(&mut runtime, &mut host) {
    ///     host.drain();
    /// }
    /// ```
    pub fn trace_step(&mut self, rt: &mut impl ForeignRuntime, host: &mut impl HostGc) -> bool {
        match plan(self.state, self.options.cycle_enabled) {
            Step::Sweep => self.sweep(rt, host),
            Step::Snapshot => self.start_pass(rt, host),
            Step::Mark => self.mark_step(host),
            Step::Finish => self.finish_pass(rt, host),
        }
    }

    /// Complete a pass synchronously, draining the host worklists between
    /// steps.
    ///
    /// # Returns
    /// The number of steps executed
    pub fn collect(&mut self, rt: &mut impl ForeignRuntime, host: &mut impl HostGc) -> usize {
        let mut steps = 0;
        loop {
            let finished = self.trace_step(rt, host);
            steps += 1;
            host.drain();
            if finished {
                break;
            }
        }
        steps
    }

    /// Plain sweep: keep alive the host counterparts of tracked foreign
    /// objects (new, in-collection and isolated) with a positive stripped
    /// refcount. Atomic containers are only untracked when unbridged, so no
    /// bridge drops out of view.
    fn sweep(&mut self, rt: &mut impl ForeignRuntime, host: &mut impl HostGc) -> bool {
        let marked = self.mark_border(rt, host, false);
        debug!(border_marked = marked, "sweep without cycle detection");

        self.stats.sweeps += 1;
        self.state = CollectorState::Default;
        self.last_outcome = Some(PassOutcome::Swept);
        true
    }

    /// Merge new objects into the in-collection set and take the snapshot.
    fn start_pass(&mut self, rt: &mut impl ForeignRuntime, host: &mut impl HostGc) -> bool {
        if self.snapshot.is_some() {
            panic!("snapshot allocated twice");
        }

        if self.options.untrack_atomic_containers {
            self.untrack_atomic_containers(rt);
        }

        // Objects whose finalizers ran are back in the new set, so they are
        // reprocessed here
        self.sets.merge(SetKind::New, SetKind::InCollection);

        let mut snapshot = Snapshot::take(&self.sets, &*rt, &*host);
        snapshot.collect_roots();

        #[cfg(feature = "check_consistency")]
        if let Err(obj) = snapshot.audit_roots() {
            panic!("root accounting broken for {obj}");
        }

        self.stats.snapshots_taken += 1;
        self.stats.last_snapshot_objects = snapshot.len();
        self.stats.last_snapshot_edges = snapshot.edge_count();
        debug!(
            objects = snapshot.len(),
            edges = snapshot.edge_count(),
            "snapshot taken, roots collected"
        );

        self.snapshot = Some(snapshot);
        self.snapshot_invalidated = false;
        self.state = CollectorState::Marking;
        false
    }

    /// Propagate liveness. Moves on once the fixed point is reached and the
    /// host GC has nothing left to trace, since tracing may reach more bridged
    /// objects.
    fn mark_step(&mut self, host: &mut impl HostGc) -> bool {
        let snapshot = match self.snapshot.as_mut() {
            Some(snapshot) => snapshot,
            None => panic!("marking without a snapshot"),
        };

        let progress = {
            let mut marker = Marker::new(snapshot, host, self.options.eager_host_trace);
            let progress = marker.run(self.options.scans_per_step);
            self.stats.scans += marker.scans;
            self.stats.promotions += marker.promoted;
            progress
        };

        if progress == MarkProgress::FixedPoint && host.worklists_drained() {
            debug!("marking reached its fixed point");
            self.state = CollectorState::GarbageMarking;
        }
        false
    }

    /// Verify, drop the snapshot, and hand dead objects off.
    fn finish_pass(&mut self, rt: &mut impl ForeignRuntime, host: &mut impl HostGc) -> bool {
        let snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => panic!("snapshot discarded twice"),
        };

        let verdict = verify(
            &snapshot,
            &mut self.sets,
            &*rt,
            &*host,
            self.snapshot_invalidated,
        );

        drop(snapshot);
        self.stats.snapshots_discarded += 1;
        self.snapshot_invalidated = false;

        // Assumption: few objects have legacy finalizers, no need to do this
        // incrementally
        let legacy = self.handle_legacy_finalizers(rt);
        self.state = CollectorState::Default;

        let isolated = self.isolate_finalizable(rt);
        let use_cyclic = isolated == 0;
        let marked = self.mark_border(rt, host, use_cyclic);
        let released = self.release_staged(rt);

        self.stats.passes += 1;
        let outcome = match verdict {
            Verdict::Consistent { dead } => {
                debug!(dead, released, isolated, legacy, border_marked = marked, "pass finished");
                PassOutcome::Collected {
                    released,
                    isolated,
                    legacy,
                }
            }
            Verdict::Inconsistent => {
                self.stats.resurrected_passes += 1;
                debug!(border_marked = marked, "pass resurrected");
                PassOutcome::Resurrected
            }
        };
        self.last_outcome = Some(outcome);
        true
    }

    // ========================================================================
    // Pass helpers
    // ========================================================================

    /// Untrack new atomic containers that hold no tracked object.
    ///
    /// Bridged containers stay tracked: border marking only walks the tracked
    /// sets, and their host counterpart must keep being marked while the
    /// foreign side holds them.
    fn untrack_atomic_containers(&mut self, rt: &mut impl ForeignRuntime) {
        let candidates: Vec<ObjectId> = self
            .sets
            .iter(SetKind::New)
            .filter(|&obj| rt.may_untrack(obj) && rt.bridge(obj).is_none())
            .collect();

        for obj in candidates {
            let mut holds_tracked = false;
            rt.traverse(obj, &mut |target: ObjectId| {
                holds_tracked |= self.sets.contains(target);
            });

            if !holds_tracked {
                self.sets.remove(obj);
                rt.untracked(obj);
                self.stats.untracked_containers += 1;
            }
        }
    }

    /// Keep dead objects with legacy finalizers, and every dead object they
    /// reach, alive. Returns the number of legacy finalizers found.
    fn handle_legacy_finalizers(&mut self, rt: &mut impl ForeignRuntime) -> usize {
        let legacy: Vec<ObjectId> = self
            .sets
            .iter(SetKind::Staged)
            .filter(|&obj| rt.finalizer_kind(obj) == FinalizerKind::Legacy)
            .collect();
        if legacy.is_empty() {
            return 0;
        }

        let mut pending = Vec::with_capacity(legacy.len());
        for &obj in &legacy {
            self.resurrect_staged(obj);
            pending.push(obj);
        }

        while let Some(obj) = pending.pop() {
            let mut reached = Vec::new();
            rt.traverse(obj, &mut |target: ObjectId| {
                if self.sets.set_of(target) == Some(SetKind::Staged) {
                    reached.push(target);
                }
            });

            for target in reached {
                if self.sets.set_of(target) == Some(SetKind::Staged) {
                    self.resurrect_staged(target);
                    pending.push(target);
                }
            }
        }

        for &obj in &legacy {
            rt.legacy_garbage(obj);
        }
        self.stats.legacy_garbage += legacy.len();
        debug!(count = legacy.len(), "legacy finalizers kept their cycles alive");
        legacy.len()
    }

    fn resurrect_staged(&mut self, obj: ObjectId) {
        self.sets.move_to(obj, SetKind::InCollection);
        self.sets.set_gc_refs(obj, 1);
    }

    /// If any dead object has a finalizer, isolate all dead objects until the
    /// finalizers have run. Returns the number of objects isolated.
    fn isolate_finalizable(&mut self, rt: &mut impl ForeignRuntime) -> usize {
        let finalizable: Vec<ObjectId> = self
            .sets
            .iter(SetKind::Staged)
            .filter(|&obj| rt.finalizer_kind(obj) == FinalizerKind::Modern)
            .collect();
        if finalizable.is_empty() {
            return 0;
        }

        // Finalizers may reach any member of the dead subgraph
        let isolated = self.sets.len(SetKind::Staged);
        self.sets.merge(SetKind::Staged, SetKind::Isolated);
        rt.schedule_finalizers(&finalizable);

        self.stats.isolated += isolated;
        debug!(
            finalizers = finalizable.len(),
            isolated, "dead objects isolated for finalizers"
        );
        isolated
    }

    /// Push the host counterpart of every alive bridged object onto the host
    /// worklist. With `use_cyclic` the verdict of the pass decides for new and
    /// in-collection objects, otherwise the raw refcount does.
    fn mark_border(
        &mut self,
        rt: &mut impl ForeignRuntime,
        host: &mut impl HostGc,
        use_cyclic: bool,
    ) -> usize {
        let mut marked = 0;
        for set in [SetKind::New, SetKind::InCollection, SetKind::Isolated] {
            let cyclic = use_cyclic && set != SetKind::Isolated;
            for obj in self.sets.iter(set) {
                let Some(bridge) = rt.bridge(obj) else {
                    continue;
                };

                let alive = if cyclic {
                    self.sets.gc_refs(obj).is_some_and(|gc_refs| gc_refs > 0)
                } else {
                    strip_host_bias(rt.refcount(obj)) > 0
                };

                if alive {
                    host.push_to_trace(bridge);
                    marked += 1;
                }
            }
        }

        self.stats.border_marked += marked;
        marked
    }

    /// Forget and release every staged object.
    fn release_staged(&mut self, rt: &mut impl ForeignRuntime) -> usize {
        let dead: Vec<ObjectId> = self.sets.iter(SetKind::Staged).collect();
        for &obj in &dead {
            self.sets.remove(obj);
        }
        for &obj in &dead {
            rt.release(obj);
        }

        self.stats.released += dead.len();
        dead.len()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(Options::default())
    }
}
