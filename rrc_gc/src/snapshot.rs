//! Snapshot of the tracked foreign object graph
//!
//! Taken once per pass, at the `Default -> Marking` transition. It holds one
//! record per in-collection object and a flat edge table. Records refer to
//! their outgoing edges by a range into that table, and edges refer to their
//! targets by record index, so the whole graph lives in two vectors.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::{
    context::{ForeignRuntime, HostGc},
    object::{strip_host_bias, HostRef, ObjectId},
    tracked::{SetKind, TrackedSets},
};

/// One tracked object as it was when the pass started
#[derive(Clone, Debug)]
pub struct SnapshotRecord {
    /// The object this record describes
    pub object: ObjectId,
    /// Raw refcount at snapshot time, host bias included
    pub refcnt: usize,
    /// Refcount not explained by edges inside the snapshot
    pub refcnt_external: usize,
    /// Bridge link at snapshot time
    pub bridge: Option<HostRef>,
    /// The bridged host object was already reachable at snapshot time
    pub bridge_rooted: bool,
    /// Found alive and propagated
    pub(crate) processed: bool,
    pub(crate) refs_index: usize,
    pub(crate) refs_len: usize,
}

impl SnapshotRecord {
    #[inline]
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.refcnt_external == 0
    }
}

/// Point-in-time capture of refcounts and edges
pub struct Snapshot {
    pub(crate) records: Vec<SnapshotRecord>,
    /// Target record index of every edge
    pub(crate) refs: Vec<u32>,
    index: HashMap<ObjectId, u32>,
}

impl Snapshot {
    /// Capture every in-collection object.
    ///
    /// References to objects outside the in-collection set are not part of any
    /// candidate cycle and are dropped.
    pub fn take(
        sets: &TrackedSets,
        rt: &impl ForeignRuntime,
        host: &impl HostGc,
    ) -> Snapshot {
        let count = sets.len(SetKind::InCollection);
        let mut index = HashMap::with_capacity(count);
        for (i, obj) in sets.iter(SetKind::InCollection).enumerate() {
            index.insert(obj, i as u32);
        }

        let mut records = Vec::with_capacity(count);
        let mut refs = Vec::new();

        for obj in sets.iter(SetKind::InCollection) {
            let refcnt = rt.refcount(obj);
            let bridge = rt.bridge(obj);
            let bridge_rooted = bridge.is_some_and(|host_obj| host.is_reachable(host_obj));

            let mut refcnt_external = strip_host_bias(refcnt);
            if bridge_rooted {
                refcnt_external += 1;
            }

            let refs_index = refs.len();
            rt.traverse(obj, &mut |target: ObjectId| {
                if let Some(&target_index) = index.get(&target) {
                    refs.push(target_index);
                }
            });

            records.push(SnapshotRecord {
                object: obj,
                refcnt,
                refcnt_external,
                bridge,
                bridge_rooted,
                processed: false,
                refs_index,
                refs_len: refs.len() - refs_index,
            });
        }

        Snapshot {
            records,
            refs,
            index,
        }
    }

    /// Subtract every internal edge from its target's external refcount.
    ///
    /// Afterwards only records held from outside the snapshot, or bridged to a
    /// host object the host GC reached, have a non-zero external refcount.
    pub fn collect_roots(&mut self) {
        for &target in &self.refs {
            let record = &mut self.records[target as usize];
            record.refcnt_external = match record.refcnt_external.checked_sub(1) {
                Some(refcnt) => refcnt,
                None => panic!(
                    "negative external refcount for {}: more internal edges than references",
                    record.object
                ),
            };
        }
    }

    /// Number of records
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Number of edges
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    /// Record index of `obj`, if it is part of the snapshot
    #[inline]
    pub fn index_of(&self, obj: ObjectId) -> Option<usize> {
        self.index.get(&obj).map(|&i| i as usize)
    }

    #[inline]
    pub fn record_of(&self, obj: ObjectId) -> Option<&SnapshotRecord> {
        self.index_of(obj).map(|i| &self.records[i])
    }

    /// Target record indices of the edges leaving record `i`
    #[inline]
    pub fn edges(&self, i: usize) -> &[u32] {
        let record = &self.records[i];
        &self.refs[record.refs_index..record.refs_index + record.refs_len]
    }

    /// Objects targeted by the edges leaving `obj`, in traversal order
    pub fn targets_of(&self, obj: ObjectId) -> Vec<ObjectId> {
        match self.index_of(obj) {
            Some(i) => self
                .edges(i)
                .iter()
                .map(|&target| self.records[target as usize].object)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of edges targeting each record
    pub fn incoming_counts(&self) -> Vec<usize> {
        let mut counts = alloc::vec![0; self.records.len()];
        for &target in &self.refs {
            counts[target as usize] += 1;
        }
        counts
    }

    /// Check the root-accounting invariant right after `collect_roots`:
    /// stripped refcount (plus one for a rooted bridge) equals external
    /// refcount plus incoming edges. Returns the first record violating it.
    pub fn audit_roots(&self) -> Result<(), ObjectId> {
        let incoming = self.incoming_counts();
        for (record, incoming) in self.records.iter().zip(incoming) {
            let intrinsic = strip_host_bias(record.refcnt) + usize::from(record.bridge_rooted);
            if intrinsic != record.refcnt_external + incoming {
                return Err(record.object);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::sim::{SimHost, SimRuntime};

    fn in_collection(rt: &SimRuntime) -> TrackedSets {
        let mut sets = TrackedSets::new();
        for obj in rt.live_objects() {
            sets.insert(obj, SetKind::InCollection);
        }
        sets
    }

    #[test]
    fn test_take_ring() {
        let mut rt = SimRuntime::new();
        let host = SimHost::new();
        let ring = rt.alloc_ring(3);

        let sets = in_collection(&rt);
        let mut snapshot = Snapshot::take(&sets, &rt, &host);

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.edge_count(), 3);
        assert_eq!(snapshot.targets_of(ring[0]), [ring[1]]);
        assert_eq!(snapshot.targets_of(ring[2]), [ring[0]]);
        assert!(snapshot.records().iter().all(|r| r.refcnt_external == 1));

        snapshot.collect_roots();
        assert!(snapshot.records().iter().all(|r| r.is_dead()));
        assert_eq!(snapshot.audit_roots(), Ok(()));
    }

    #[test]
    fn test_untracked_targets_are_ignored() {
        let mut rt = SimRuntime::new();
        let host = SimHost::new();
        let a = rt.alloc();
        let leaf = rt.alloc();
        rt.add_ref(a, leaf);
        rt.incref(a);

        let mut sets = TrackedSets::new();
        sets.insert(a, SetKind::InCollection);
        // Only in-collection objects are part of the snapshot
        sets.insert(leaf, SetKind::Isolated);

        let snapshot = Snapshot::take(&sets, &rt, &host);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.edge_count(), 0);
        assert_eq!(snapshot.index_of(leaf), None);
    }

    #[test]
    fn test_host_bias_and_rooted_bridge() {
        let mut rt = SimRuntime::new();
        let mut host = SimHost::new();
        let a = rt.alloc();
        let h = host.alloc();
        rt.link(a, h);
        host.add_root(h);
        host.begin_collection();
        host.drain();

        let sets = in_collection(&rt);
        let mut snapshot = Snapshot::take(&sets, &rt, &host);
        let record = snapshot.record_of(a).unwrap();
        assert!(record.refcnt >= crate::REFCNT_FROM_HOST);
        assert!(record.bridge_rooted);
        assert_eq!(record.refcnt_external, 1);

        snapshot.collect_roots();
        assert_eq!(snapshot.audit_roots(), Ok(()));
    }

    #[test]
    fn test_incoming_counts() {
        let mut rt = SimRuntime::new();
        let host = SimHost::new();
        let a = rt.alloc();
        let b = rt.alloc();
        rt.add_ref(a, b);
        rt.add_ref(a, b);
        rt.add_ref(b, a);

        let sets = in_collection(&rt);
        let snapshot = Snapshot::take(&sets, &rt, &host);
        let counts: Vec<usize> = snapshot.incoming_counts();
        assert_eq!(counts[snapshot.index_of(a).unwrap()], 1);
        assert_eq!(counts[snapshot.index_of(b).unwrap()], 2);
    }

    #[test]
    #[should_panic(expected = "negative external refcount")]
    fn test_refcount_below_edges_panics() {
        let mut rt = SimRuntime::new();
        let host = SimHost::new();
        let a = rt.alloc();
        let b = rt.alloc();
        rt.add_ref(a, b);
        // Break the runtime's bookkeeping
        rt.set_refcount(b, 0);

        let sets = in_collection(&rt);
        let mut snapshot = Snapshot::take(&sets, &rt, &host);
        snapshot.collect_roots();
    }
}
