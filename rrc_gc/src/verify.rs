//! Consistency check of a finished marking phase
//!
//! The program runs between two steps of a pass, so the graph may have
//! changed since the snapshot. Before anything is freed, every object the
//! snapshot concluded dead has its refcount, its outgoing references and the
//! reachability of its bridged host object compared against the snapshot. A
//! single difference anywhere keeps every object of the pass alive; the next
//! pass starts over with a fresh snapshot.

use tracing::debug;

use crate::{
    context::{ForeignRuntime, HostGc},
    object::ObjectId,
    snapshot::Snapshot,
    tracked::{SetKind, TrackedSets},
};

/// Outcome of the consistency check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Dead objects were moved to the staged set
    Consistent { dead: usize },
    /// Nothing is dead this pass
    Inconsistent,
}

/// Sync the snapshot's verdicts back into the tracked sets.
///
/// Every in-collection object takes its record's external refcount as its
/// cyclic refcount. Dead objects that pass the check move to the staged set.
/// If `invalidated` is set, or any check fails, everything is resurrected.
pub fn verify(
    snapshot: &Snapshot,
    sets: &mut TrackedSets,
    rt: &impl ForeignRuntime,
    host: &impl HostGc,
    invalidated: bool,
) -> Verdict {
    if invalidated {
        debug!("snapshot invalidated by untracking, resurrecting pass");
        resurrect(sets);
        return Verdict::Inconsistent;
    }

    let mut dead = 0;
    let mut cursor = sets.first(SetKind::InCollection);
    while let Some(obj) = cursor {
        let next = sets.next_of(obj);

        match snapshot.index_of(obj) {
            Some(i) => {
                let record = &snapshot.records[i];
                sets.set_gc_refs(obj, record.refcnt_external);
                if record.refcnt_external == 0 {
                    if !replay_matches(snapshot, i, sets, rt, host) {
                        debug!(object = %obj, "dead object changed since snapshot, resurrecting pass");
                        resurrect(sets);
                        return Verdict::Inconsistent;
                    }
                    sets.move_to(obj, SetKind::Staged);
                    dead += 1;
                }
            }
            None => sets.set_gc_refs(obj, 1),
        }

        cursor = next;
    }

    Verdict::Consistent { dead }
}

/// Compare the current state of the dead object behind record `i` with the
/// snapshot: same raw refcount, same tracked references in the same order,
/// and a bridged host object the host GC still has not reached.
fn replay_matches(
    snapshot: &Snapshot,
    i: usize,
    sets: &TrackedSets,
    rt: &impl ForeignRuntime,
    host: &impl HostGc,
) -> bool {
    let record = &snapshot.records[i];
    if rt.refcount(record.object) != record.refcnt {
        return false;
    }

    // Marking ended with drained host worklists and this bridge unreached.
    // Host stores do not touch the foreign refcount, so only the flags tell.
    if record.bridge.is_some_and(|bridge| host.is_reachable(bridge)) {
        return false;
    }

    let expected = snapshot.edges(i);
    let mut position = 0;
    let mut consistent = true;

    rt.traverse(record.object, &mut |target: ObjectId| {
        // Same filter as snapshot time: isolated and untracked objects were
        // never recorded
        match sets.set_of(target) {
            None | Some(SetKind::Isolated) => return,
            Some(_) => {}
        }

        match expected.get(position) {
            Some(&recorded) if snapshot.records[recorded as usize].object == target => {}
            // Reference changed or was added
            _ => consistent = false,
        }
        position += 1;
    });

    // References removed
    consistent && position == expected.len()
}

/// Keep every object of the pass alive
fn resurrect(sets: &mut TrackedSets) {
    let mut cursor = sets.first(SetKind::InCollection);
    while let Some(obj) = cursor {
        if sets.gc_refs(obj) == Some(0) {
            sets.set_gc_refs(obj, 1);
        }
        cursor = sets.next_of(obj);
    }

    let mut cursor = sets.first(SetKind::Staged);
    while let Some(obj) = cursor {
        sets.set_gc_refs(obj, 1);
        cursor = sets.next_of(obj);
    }
    sets.merge(SetKind::Staged, SetKind::InCollection);
}
