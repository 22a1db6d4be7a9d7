//! In-memory reference implementations of both collaborators
//!
//! `SimRuntime` is a tiny refcounted object arena and `SimHost` a tiny mark
//! phase of a tracing GC. They back the tests, the benchmarks and the example
//! driver, and show what an embedding has to provide.
//!
//! Neither side frees anything on its own. Objects only go away when the
//! collector releases them.

use alloc::vec::Vec;

use crate::{
    context::{ForeignRuntime, HostFlags, HostGc, RefVisitor},
    object::{FinalizerKind, HostRef, ObjectId, REFCNT_FROM_HOST},
};

#[derive(Debug, Default)]
struct SimObject {
    refcnt: usize,
    refs: Vec<ObjectId>,
    bridge: Option<HostRef>,
    finalizer: FinalizerKind,
    atomic: bool,
    released: bool,
}

/// A refcounted object arena
#[derive(Debug, Default)]
pub struct SimRuntime {
    objects: Vec<SimObject>,
    released: Vec<ObjectId>,
    legacy_garbage: Vec<ObjectId>,
    finalizers_scheduled: Vec<ObjectId>,
    untracked: Vec<ObjectId>,
}

impl SimRuntime {
    pub fn new() -> SimRuntime {
        SimRuntime::default()
    }

    /// Allocate an object nobody refers to yet
    pub fn alloc(&mut self) -> ObjectId {
        let id = ObjectId::new(self.objects.len() as u32);
        self.objects.push(SimObject::default());
        id
    }

    /// Allocate `n` objects, each referring to the next and the last to the
    /// first. Every member ends up with a refcount of one.
    pub fn alloc_ring(&mut self, n: usize) -> Vec<ObjectId> {
        let ring: Vec<ObjectId> = (0..n).map(|_| self.alloc()).collect();
        for (i, &obj) in ring.iter().enumerate() {
            self.add_ref(obj, ring[(i + 1) % n]);
        }
        ring
    }

    #[inline]
    fn object(&self, obj: ObjectId) -> &SimObject {
        &self.objects[obj.index()]
    }

    #[inline]
    fn object_mut(&mut self, obj: ObjectId) -> &mut SimObject {
        &mut self.objects[obj.index()]
    }

    /// Store a reference to `to` in `from`
    pub fn add_ref(&mut self, from: ObjectId, to: ObjectId) {
        self.object_mut(from).refs.push(to);
        self.incref(to);
    }

    /// Store a reference without accounting for it, like a borrowed pointer
    pub fn add_ref_uncounted(&mut self, from: ObjectId, to: ObjectId) {
        self.object_mut(from).refs.push(to);
    }

    /// Drop the first reference from `from` to `to`
    pub fn remove_ref(&mut self, from: ObjectId, to: ObjectId) -> bool {
        if self.forget_ref(from, to) {
            self.decref(to);
            true
        } else {
            false
        }
    }

    /// Drop the first reference from `from` to `to`, leaving the refcount of
    /// `to` untouched
    pub fn forget_ref(&mut self, from: ObjectId, to: ObjectId) -> bool {
        let refs = &mut self.object_mut(from).refs;
        match refs.iter().position(|&target| target == to) {
            Some(position) => {
                refs.remove(position);
                true
            }
            None => false,
        }
    }

    /// Point reference number `slot` of `obj` at `target` instead
    pub fn retarget(&mut self, obj: ObjectId, slot: usize, target: ObjectId) {
        let old = core::mem::replace(&mut self.object_mut(obj).refs[slot], target);
        self.incref(target);
        self.decref(old);
    }

    /// A reference from outside the arena
    pub fn incref(&mut self, obj: ObjectId) {
        self.object_mut(obj).refcnt += 1;
    }

    pub fn decref(&mut self, obj: ObjectId) {
        let object = self.object_mut(obj);
        object.refcnt = object.refcnt.saturating_sub(1);
    }

    pub fn set_refcount(&mut self, obj: ObjectId, refcnt: usize) {
        self.object_mut(obj).refcnt = refcnt;
    }

    /// Link `obj` to its host counterpart, which then holds on to it
    pub fn link(&mut self, obj: ObjectId, host: HostRef) {
        let object = self.object_mut(obj);
        object.bridge = Some(host);
        object.refcnt += REFCNT_FROM_HOST;
    }

    pub fn set_finalizer(&mut self, obj: ObjectId, kind: FinalizerKind) {
        self.object_mut(obj).finalizer = kind;
    }

    /// Mark `obj` as an immutable container
    pub fn set_atomic(&mut self, obj: ObjectId) {
        self.object_mut(obj).atomic = true;
    }

    /// References stored in `obj`
    pub fn refs(&self, obj: ObjectId) -> &[ObjectId] {
        &self.object(obj).refs
    }

    /// Objects not released yet, in allocation order
    pub fn live_objects(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| !object.released)
            .map(|(i, _)| ObjectId::new(i as u32))
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_released(&self, obj: ObjectId) -> bool {
        self.object(obj).released
    }

    /// Objects released by the collector, in release order
    pub fn released(&self) -> &[ObjectId] {
        &self.released
    }

    pub fn legacy_garbage_list(&self) -> &[ObjectId] {
        &self.legacy_garbage
    }

    pub fn finalizers_scheduled(&self) -> &[ObjectId] {
        &self.finalizers_scheduled
    }

    pub fn untracked_containers(&self) -> &[ObjectId] {
        &self.untracked
    }
}

impl ForeignRuntime for SimRuntime {
    fn refcount(&self, obj: ObjectId) -> usize {
        self.object(obj).refcnt
    }

    fn bridge(&self, obj: ObjectId) -> Option<HostRef> {
        self.object(obj).bridge
    }

    fn traverse(&self, obj: ObjectId, visitor: &mut impl RefVisitor) {
        for &target in &self.object(obj).refs {
            visitor.visit(target);
        }
    }

    fn finalizer_kind(&self, obj: ObjectId) -> FinalizerKind {
        self.object(obj).finalizer
    }

    fn may_untrack(&self, obj: ObjectId) -> bool {
        self.object(obj).atomic
    }

    fn untracked(&mut self, obj: ObjectId) {
        self.untracked.push(obj);
    }

    fn release(&mut self, obj: ObjectId) {
        let object = self.object_mut(obj);
        if object.released {
            panic!("object {obj} released twice");
        }
        object.released = true;
        object.bridge = None;
        let refs = core::mem::take(&mut object.refs);

        for target in refs {
            self.decref(target);
        }
        self.released.push(obj);
    }

    fn legacy_garbage(&mut self, obj: ObjectId) {
        self.legacy_garbage.push(obj);
    }

    fn schedule_finalizers(&mut self, objs: &[ObjectId]) {
        self.finalizers_scheduled.extend_from_slice(objs);
    }
}

#[derive(Debug, Default)]
struct SimHostObject {
    flags: HostFlags,
    edges: Vec<HostRef>,
}

/// Mark phase of a tracing GC over a fixed object graph
#[derive(Debug, Default)]
pub struct SimHost {
    objects: Vec<SimHostObject>,
    roots: Vec<HostRef>,
    worklist: Vec<HostRef>,
    /// Objects pushed by the collector
    promoted: Vec<HostRef>,
}

impl SimHost {
    pub fn new() -> SimHost {
        SimHost::default()
    }

    pub fn alloc(&mut self) -> HostRef {
        let id = HostRef::new(self.objects.len() as u32);
        self.objects.push(SimHostObject::default());
        id
    }

    pub fn add_root(&mut self, obj: HostRef) {
        self.roots.push(obj);
    }

    pub fn add_edge(&mut self, from: HostRef, to: HostRef) {
        self.objects[from.index()].edges.push(to);
    }

    /// Prebuilt object, always alive
    pub fn set_no_heap_ptrs(&mut self, obj: HostRef) {
        self.objects[obj.index()].flags |= HostFlags::NO_HEAP_PTRS;
    }

    /// Start a major collection: clear all marks and queue the roots
    pub fn begin_collection(&mut self) {
        for object in &mut self.objects {
            object.flags.remove(HostFlags::VISITED);
        }
        self.worklist.clear();
        self.worklist.extend_from_slice(&self.roots);
        self.promoted.clear();
    }

    /// The program stored `obj` into an already marked object. Queue it the
    /// way an incremental write barrier would; the next `drain` marks it.
    pub fn write_barrier(&mut self, obj: HostRef) {
        self.worklist.push(obj);
    }

    #[inline]
    pub fn is_visited(&self, obj: HostRef) -> bool {
        self.objects[obj.index()].flags.contains(HostFlags::VISITED)
    }

    /// Objects pushed by the collector since the collection started
    pub fn promoted(&self) -> &[HostRef] {
        &self.promoted
    }
}

impl HostGc for SimHost {
    fn flags(&self, obj: HostRef) -> HostFlags {
        self.objects[obj.index()].flags
    }

    fn push_to_trace(&mut self, obj: HostRef) {
        self.promoted.push(obj);
        self.worklist.push(obj);
    }

    fn worklists_drained(&self) -> bool {
        self.worklist.is_empty()
    }

    fn drain(&mut self) {
        while let Some(obj) = self.worklist.pop() {
            let object = &mut self.objects[obj.index()];
            if object.flags.contains(HostFlags::VISITED) {
                continue;
            }
            object.flags |= HostFlags::VISITED;
            self.worklist.extend_from_slice(&object.edges);
        }
    }
}
