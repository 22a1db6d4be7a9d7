//! Raw-refcount cycle collector
//!
//! An incremental collector for reference cycles that span a tracing host GC
//! and a reference-counted foreign runtime. Neither side can reclaim such a
//! cycle on its own: the foreign refcounts never drop to zero and the host GC
//! does not look inside foreign objects.
//!
//! Each pass takes a snapshot of all tracked foreign objects, subtracts the
//! references internal to the snapshot, propagates liveness from the remaining
//! external holders and from bridged host objects the host GC has visited, and
//! finally replays the traversal of every object concluded dead to make sure
//! the graph did not change while the program ran between steps.
//!
//! Key types:
//! - `Collector`: The incremental state machine, driven by the host GC
//! - `Snapshot`: Point-in-time capture of refcounts and edges
//! - `TrackedSets`: The ordered sets tracked objects move between
//!
//! Key traits:
//! - `ForeignRuntime`: Implemented by the refcounted runtime, provides refcounts and traversal
//! - `HostGc`: Implemented by the tracing GC, provides visited flags and the trace worklist
//! - `RefVisitor`: Used by objects to report their outgoing references

#![no_std]
extern crate alloc;

mod collector;
mod context;
mod error;
mod marker;
mod object;
mod options;
mod snapshot;
mod state;
mod stats;
mod tracked;
mod verify;

pub mod sim;

pub use collector::Collector;
pub use context::{ForeignRuntime, HostFlags, HostGc, RefVisitor};
pub use error::{TrackError, TrackResult};
pub use object::{
    strip_host_bias, FinalizerKind, HostRef, ObjectId, REFCNT_FROM_HOST, REFCNT_FROM_HOST_LIGHT,
};
pub use options::{Options, OptionsBuilder};
pub use snapshot::{Snapshot, SnapshotRecord};
pub use state::{CollectorState, PassOutcome};
pub use stats::Stats;
pub use tracked::{SetKind, TrackedSets};
