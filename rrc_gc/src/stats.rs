/// Collector statistics
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Passes that ran cycle detection to completion
    pub passes: usize,

    /// Sweeps without cycle detection
    pub sweeps: usize,

    /// Snapshots allocated
    pub snapshots_taken: usize,

    /// Snapshots dropped
    pub snapshots_discarded: usize,

    /// Records in the last snapshot
    pub last_snapshot_objects: usize,

    /// Edges in the last snapshot
    pub last_snapshot_edges: usize,

    /// Full marking scans
    pub scans: usize,

    /// Bridged objects handed to the host GC while marking
    pub promotions: usize,

    /// Bridged objects handed to the host GC by border marking
    pub border_marked: usize,

    /// Dead objects released to the foreign runtime
    pub released: usize,

    /// Dead objects isolated for finalizers
    pub isolated: usize,

    /// Dead objects reported as legacy garbage
    pub legacy_garbage: usize,

    /// Passes that found the graph changed and collected nothing
    pub resurrected_passes: usize,

    /// Atomic containers no longer tracked
    pub untracked_containers: usize,
}

impl Stats {
    /// Whether every snapshot taken so far was also dropped
    pub fn snapshots_balanced(&self) -> bool {
        self.snapshots_taken == self.snapshots_discarded
    }
}
