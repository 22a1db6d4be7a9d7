//! Foreign object model
//!
//! The collector never owns foreign objects. It names them by `ObjectId`, an
//! index into the foreign runtime's object arena, and names host objects by
//! `HostRef`. Everything else about an object is read through
//! `ForeignRuntime`.

use core::fmt;

/// Index of a foreign object in the foreign runtime's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub const fn new(index: u32) -> ObjectId {
        ObjectId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to an object managed by the host tracing GC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct HostRef(u32);

impl HostRef {
    #[inline]
    pub const fn new(index: u32) -> HostRef {
        HostRef(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

/// Bias the foreign runtime adds to the refcount of an object while its host
/// counterpart holds on to it.
pub const REFCNT_FROM_HOST: usize = usize::MAX / 4 + 1;

/// Bias for objects linked to a host counterpart that carries no state of its
/// own. Always larger than `REFCNT_FROM_HOST`.
pub const REFCNT_FROM_HOST_LIGHT: usize = REFCNT_FROM_HOST + usize::MAX / 2 + 1;

/// Remove the host bias from a raw refcount, leaving only the references held
/// by the foreign runtime itself.
#[inline]
pub const fn strip_host_bias(refcnt: usize) -> usize {
    if refcnt >= REFCNT_FROM_HOST_LIGHT {
        refcnt - REFCNT_FROM_HOST_LIGHT
    } else if refcnt >= REFCNT_FROM_HOST {
        refcnt - REFCNT_FROM_HOST
    } else {
        refcnt
    }
}

/// Finalization protocol an object is enrolled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FinalizerKind {
    /// Dead objects can be released right away
    #[default]
    None,
    /// Old-style finalizer. Dead objects are reported as uncollectable garbage
    /// and kept alive together with everything they reach.
    Legacy,
    /// Finalizer that may run on a dead cycle. The cycle is isolated until the
    /// finalizers have run.
    Modern,
}
