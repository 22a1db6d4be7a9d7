//! Liveness propagation over a snapshot
//!
//! A record is alive if something outside the snapshot holds it, or if it is
//! bridged to a host object the host GC has reached. Alive records pass their
//! liveness along their edges and hand their bridged host object to the host
//! GC, which may in turn reach more bridged objects. Scans repeat until one
//! full scan finds nothing new.

use tracing::trace;

use crate::{context::HostGc, snapshot::Snapshot};

/// Result of a bounded amount of marking work
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkProgress {
    /// The last scan found no new alive record
    FixedPoint,
    /// The scan budget ran out before the fixed point
    Pending,
}

/// Runs scans over a snapshot, promoting bridged objects to the host GC.
pub struct Marker<'a, H: HostGc> {
    snapshot: &'a mut Snapshot,
    host: &'a mut H,
    /// Drain the host worklist after every promotion
    eager_host_trace: bool,
    /// Full scans performed
    pub scans: usize,
    /// Bridged objects handed to the host GC
    pub promoted: usize,
}

impl<'a, H: HostGc> Marker<'a, H> {
    pub fn new(snapshot: &'a mut Snapshot, host: &'a mut H, eager_host_trace: bool) -> Self {
        Marker {
            snapshot,
            host,
            eager_host_trace,
            scans: 0,
            promoted: 0,
        }
    }

    /// Scan until the fixed point, or until `scan_limit` scans have run.
    ///
    /// There is no overall cap: a long chain only needs more calls.
    pub fn run(&mut self, scan_limit: Option<usize>) -> MarkProgress {
        let limit = scan_limit.map(|limit| limit.max(1));
        let mut scans_this_call = 0;

        loop {
            if self.scan() == 0 {
                return MarkProgress::FixedPoint;
            }

            scans_this_call += 1;
            if limit.is_some_and(|limit| scans_this_call >= limit) {
                return MarkProgress::Pending;
            }
        }
    }

    /// One full scan over all unprocessed records.
    /// Returns the number of records found alive.
    pub fn scan(&mut self) -> usize {
        self.scans += 1;

        let mut found_alive = 0;
        for i in 0..self.snapshot.records.len() {
            if self.mark_record(i) {
                found_alive += 1;
            }
        }
        found_alive
    }

    fn mark_record(&mut self, i: usize) -> bool {
        let record = &mut self.snapshot.records[i];
        if record.processed {
            return false;
        }

        let mut alive = record.refcnt_external > 0;
        if !alive {
            if let Some(bridge) = record.bridge {
                if self.host.is_reachable(bridge) {
                    // Cross-domain root
                    alive = true;
                    record.refcnt_external += 1;
                }
            }
        }

        if !alive {
            return false;
        }

        record.processed = true;
        let bridge = record.bridge;
        let start = record.refs_index;
        let end = start + record.refs_len;

        for k in start..end {
            let target = self.snapshot.refs[k] as usize;
            self.snapshot.records[target].refcnt_external += 1;
        }

        if let Some(bridge) = bridge {
            trace!(object = %self.snapshot.records[i].object, %bridge, "promote bridged object");
            self.host.push_to_trace(bridge);
            self.promoted += 1;
            if self.eager_host_trace {
                self.host.drain();
            }
        }

        true
    }
}
