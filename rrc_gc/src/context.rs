//! Collaborator traits
//!
//! These traits decouple the collector from both memory-management domains.
//! - `RefVisitor`: Implemented by the collector, used by foreign objects to report their references
//! - `ForeignRuntime`: Implemented by the refcounted runtime
//! - `HostGc`: Implemented by the host tracing GC

use bitflags::bitflags;

use crate::object::{FinalizerKind, HostRef, ObjectId};

/// Visitor passed to `ForeignRuntime::traverse`.
///
/// # Example
/// ```ignore
/// fn traverse(&self, obj: ObjectId, visitor: &mut impl RefVisitor) {
///     for item in &self.list(obj).items {
///         visitor.visit(*item);
///     }
/// }
/// ```
pub trait RefVisitor {
    /// Report one outgoing reference
    fn visit(&mut self, obj: ObjectId);
}

impl<F: FnMut(ObjectId)> RefVisitor for F {
    #[inline]
    fn visit(&mut self, obj: ObjectId) {
        self(obj)
    }
}

bitflags! {
    /// Header flags of a host object, as far as the collector cares about them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HostFlags: u8 {
        /// Marked by the host GC in the current major collection
        const VISITED = 1 << 0;
        /// Prebuilt object without heap pointers, always alive
        const NO_HEAP_PTRS = 1 << 1;
        /// Either flag keeps the object alive
        const REACHABLE = Self::VISITED.bits() | Self::NO_HEAP_PTRS.bits();
    }
}

/// Foreign runtime interface - implemented by the refcounted runtime
///
/// Provides the collector with refcounts, bridge links and traversal, and
/// receives the objects the collector concluded dead.
pub trait ForeignRuntime {
    /// Raw intrinsic refcount, including any host bias
    fn refcount(&self, obj: ObjectId) -> usize;

    /// Host object this foreign object is linked to
    fn bridge(&self, obj: ObjectId) -> Option<HostRef>;

    /// Report every outgoing reference of `obj`.
    ///
    /// Each reference must be reported exactly once, in an order that does not
    /// change between two calls for an unmodified object.
    fn traverse(&self, obj: ObjectId, visitor: &mut impl RefVisitor);

    /// Finalization protocol of `obj`
    fn finalizer_kind(&self, obj: ObjectId) -> FinalizerKind {
        let _ = obj;
        FinalizerKind::None
    }

    /// Whether `obj` may stop being tracked once it only holds untracked
    /// references (immutable containers).
    fn may_untrack(&self, obj: ObjectId) -> bool {
        let _ = obj;
        false
    }

    /// Called after the collector untracked an atomic container
    fn untracked(&mut self, obj: ObjectId) {
        let _ = obj;
    }

    /// Reclaim a dead object. The collector has already forgotten it.
    fn release(&mut self, obj: ObjectId);

    /// A dead object with a legacy finalizer. It stays tracked and alive; the
    /// runtime is expected to keep it in its list of uncollectable garbage.
    fn legacy_garbage(&mut self, obj: ObjectId) {
        let _ = obj;
    }

    /// Dead objects whose finalizers should run. Their cycle stays isolated
    /// until `Collector::finalizers_done` is called.
    fn schedule_finalizers(&mut self, objs: &[ObjectId]) {
        let _ = objs;
    }
}

/// Host GC interface - implemented by the tracing GC
pub trait HostGc {
    /// Current header flags of a host object
    fn flags(&self, obj: HostRef) -> HostFlags;

    /// Append an object to the pending-trace worklist
    fn push_to_trace(&mut self, obj: HostRef);

    /// Whether all pending-trace worklists are empty
    fn worklists_drained(&self) -> bool;

    /// Trace everything on the worklists
    fn drain(&mut self);

    /// Whether the host GC currently considers `obj` alive
    #[inline]
    fn is_reachable(&self, obj: HostRef) -> bool {
        self.flags(obj).intersects(HostFlags::REACHABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_flags() {
        assert!(!HostFlags::empty().intersects(HostFlags::REACHABLE));
        assert!(HostFlags::VISITED.intersects(HostFlags::REACHABLE));
        assert!(HostFlags::NO_HEAP_PTRS.intersects(HostFlags::REACHABLE));
    }

    #[test]
    fn test_closure_visitor() {
        let mut seen = alloc::vec::Vec::new();
        {
            let mut visitor = |obj: ObjectId| seen.push(obj);
            visitor.visit(ObjectId::new(1));
            visitor.visit(ObjectId::new(4));
        }
        assert_eq!(seen, [ObjectId::new(1), ObjectId::new(4)]);
    }
}
