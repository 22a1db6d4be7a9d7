//! Tracked object sets
//!
//! Every tracked foreign object is a member of exactly one ordered set. The
//! sets are doubly linked through a side table keyed by `ObjectId`, so moving
//! one object between sets is O(1) and iteration follows insertion order.

use hashbrown::HashMap;

use crate::object::ObjectId;

/// The role a tracked object currently plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetKind {
    /// Registered since the last pass started
    New,
    /// Subject of the current (or next) pass
    InCollection,
    /// Concluded dead, waiting for finalizers to run
    Isolated,
    /// Concluded dead in the pass being finished, not handed off yet
    Staged,
}

impl SetKind {
    const COUNT: usize = 4;

    #[inline]
    const fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug)]
struct Link {
    set: SetKind,
    prev: Option<ObjectId>,
    next: Option<ObjectId>,
    /// Cyclic refcount from the last pass, > 0 means alive
    gc_refs: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct Ends {
    head: Option<ObjectId>,
    tail: Option<ObjectId>,
    len: usize,
}

/// The new, in-collection, isolated and staged sets
pub struct TrackedSets {
    links: HashMap<ObjectId, Link>,
    ends: [Ends; SetKind::COUNT],
}

impl TrackedSets {
    pub fn new() -> TrackedSets {
        TrackedSets {
            links: HashMap::new(),
            ends: [Ends::default(); SetKind::COUNT],
        }
    }

    /// Total number of tracked objects
    #[inline]
    pub fn total(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn len(&self, set: SetKind) -> usize {
        self.ends[set.slot()].len
    }

    #[inline]
    pub fn is_empty(&self, set: SetKind) -> bool {
        self.ends[set.slot()].head.is_none()
    }

    #[inline]
    pub fn contains(&self, obj: ObjectId) -> bool {
        self.links.contains_key(&obj)
    }

    /// The set `obj` is a member of
    #[inline]
    pub fn set_of(&self, obj: ObjectId) -> Option<SetKind> {
        self.links.get(&obj).map(|link| link.set)
    }

    /// Append `obj` to `set`. Returns false if it is already tracked.
    pub fn insert(&mut self, obj: ObjectId, set: SetKind) -> bool {
        if self.links.contains_key(&obj) {
            return false;
        }

        self.links.insert(
            obj,
            Link {
                set,
                prev: None,
                next: None,
                gc_refs: 1,
            },
        );
        self.push_back(obj, set);
        true
    }

    /// Forget `obj`, returning the set it was in
    pub fn remove(&mut self, obj: ObjectId) -> Option<SetKind> {
        let set = self.unlink(obj)?;
        self.links.remove(&obj);
        Some(set)
    }

    /// Move `obj` to the end of `set`
    pub fn move_to(&mut self, obj: ObjectId, set: SetKind) {
        if self.unlink(obj).is_none() {
            panic!("cannot move untracked object {obj}");
        }
        self.push_back(obj, set);
    }

    /// Append every member of `from` to `into`, keeping their order
    pub fn merge(&mut self, from: SetKind, into: SetKind) {
        debug_assert!(from != into);

        let source = self.ends[from.slot()];
        let Some(first) = source.head else {
            return;
        };

        let mut cursor = Some(first);
        while let Some(obj) = cursor {
            let link = self.link_mut(obj);
            link.set = into;
            cursor = link.next;
        }

        let target = self.ends[into.slot()];
        match target.tail {
            Some(tail) => {
                self.link_mut(tail).next = Some(first);
                self.link_mut(first).prev = Some(tail);
            }
            None => self.ends[into.slot()].head = Some(first),
        }

        let ends = &mut self.ends[into.slot()];
        ends.tail = source.tail;
        ends.len += source.len;
        self.ends[from.slot()] = Ends::default();
    }

    /// First member of `set`
    #[inline]
    pub fn first(&self, set: SetKind) -> Option<ObjectId> {
        self.ends[set.slot()].head
    }

    /// Member after `obj` in its set
    #[inline]
    pub fn next_of(&self, obj: ObjectId) -> Option<ObjectId> {
        self.links.get(&obj).and_then(|link| link.next)
    }

    /// Iterate over the members of `set` in order
    pub fn iter(&self, set: SetKind) -> Iter<'_> {
        Iter {
            sets: self,
            cursor: self.ends[set.slot()].head,
        }
    }

    /// Cyclic refcount of a tracked object
    #[inline]
    pub fn gc_refs(&self, obj: ObjectId) -> Option<usize> {
        self.links.get(&obj).map(|link| link.gc_refs)
    }

    #[inline]
    pub fn set_gc_refs(&mut self, obj: ObjectId, gc_refs: usize) {
        self.link_mut(obj).gc_refs = gc_refs;
    }

    fn link_mut(&mut self, obj: ObjectId) -> &mut Link {
        match self.links.get_mut(&obj) {
            Some(link) => link,
            None => panic!("object {obj} is not tracked"),
        }
    }

    fn unlink(&mut self, obj: ObjectId) -> Option<SetKind> {
        let link = *self.links.get(&obj)?;

        match link.prev {
            Some(prev) => self.link_mut(prev).next = link.next,
            None => self.ends[link.set.slot()].head = link.next,
        }
        match link.next {
            Some(next) => self.link_mut(next).prev = link.prev,
            None => self.ends[link.set.slot()].tail = link.prev,
        }

        let ends = &mut self.ends[link.set.slot()];
        debug_assert!(ends.len > 0);
        ends.len -= 1;

        let link = self.link_mut(obj);
        link.prev = None;
        link.next = None;
        Some(link.set)
    }

    fn push_back(&mut self, obj: ObjectId, set: SetKind) {
        let tail = self.ends[set.slot()].tail;
        {
            let link = self.link_mut(obj);
            link.set = set;
            link.prev = tail;
            link.next = None;
        }

        match tail {
            Some(tail) => self.link_mut(tail).next = Some(obj),
            None => self.ends[set.slot()].head = Some(obj),
        }

        let ends = &mut self.ends[set.slot()];
        ends.tail = Some(obj);
        ends.len += 1;
    }
}

impl Default for TrackedSets {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over one tracked set
pub struct Iter<'a> {
    sets: &'a TrackedSets,
    cursor: Option<ObjectId>,
}

impl Iterator for Iter<'_> {
    type Item = ObjectId;

    fn next(&mut self) -> Option<ObjectId> {
        let obj = self.cursor?;
        self.cursor = self.sets.next_of(obj);
        Some(obj)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn ids(sets: &TrackedSets, set: SetKind) -> Vec<u32> {
        sets.iter(set).map(|obj| obj.index() as u32).collect()
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut sets = TrackedSets::new();
        for i in 0..4 {
            assert!(sets.insert(ObjectId::new(i), SetKind::New));
        }
        assert!(!sets.insert(ObjectId::new(2), SetKind::InCollection));

        assert_eq!(ids(&sets, SetKind::New), [0, 1, 2, 3]);
        assert_eq!(sets.len(SetKind::New), 4);
        assert_eq!(sets.set_of(ObjectId::new(2)), Some(SetKind::New));
        assert_eq!(sets.gc_refs(ObjectId::new(2)), Some(1));
    }

    #[test]
    fn test_move_between_sets() {
        let mut sets = TrackedSets::new();
        for i in 0..3 {
            sets.insert(ObjectId::new(i), SetKind::InCollection);
        }

        // Middle, head, then tail
        sets.move_to(ObjectId::new(1), SetKind::Staged);
        sets.move_to(ObjectId::new(0), SetKind::Staged);
        assert_eq!(ids(&sets, SetKind::InCollection), [2]);
        assert_eq!(ids(&sets, SetKind::Staged), [1, 0]);

        sets.move_to(ObjectId::new(2), SetKind::Staged);
        assert!(sets.is_empty(SetKind::InCollection));
        assert_eq!(sets.len(SetKind::InCollection), 0);
        assert_eq!(ids(&sets, SetKind::Staged), [1, 0, 2]);
        assert_eq!(sets.total(), 3);
    }

    #[test]
    fn test_remove() {
        let mut sets = TrackedSets::new();
        for i in 0..3 {
            sets.insert(ObjectId::new(i), SetKind::New);
        }

        assert_eq!(sets.remove(ObjectId::new(1)), Some(SetKind::New));
        assert_eq!(sets.remove(ObjectId::new(1)), None);
        assert!(!sets.contains(ObjectId::new(1)));
        assert_eq!(ids(&sets, SetKind::New), [0, 2]);

        sets.remove(ObjectId::new(0));
        sets.remove(ObjectId::new(2));
        assert!(sets.is_empty(SetKind::New));
        assert_eq!(sets.first(SetKind::New), None);
    }

    #[test]
    fn test_merge() {
        let mut sets = TrackedSets::new();
        sets.insert(ObjectId::new(0), SetKind::InCollection);
        sets.insert(ObjectId::new(1), SetKind::New);
        sets.insert(ObjectId::new(2), SetKind::New);

        sets.merge(SetKind::New, SetKind::InCollection);
        assert_eq!(ids(&sets, SetKind::InCollection), [0, 1, 2]);
        assert!(sets.is_empty(SetKind::New));
        assert_eq!(sets.len(SetKind::InCollection), 3);
        assert_eq!(sets.set_of(ObjectId::new(2)), Some(SetKind::InCollection));

        // Merging an empty set is a no-op
        sets.merge(SetKind::New, SetKind::InCollection);
        assert_eq!(sets.len(SetKind::InCollection), 3);

        // Merging into an empty set
        sets.merge(SetKind::InCollection, SetKind::Isolated);
        assert_eq!(ids(&sets, SetKind::Isolated), [0, 1, 2]);

        // New members keep being appended after a merge
        sets.insert(ObjectId::new(3), SetKind::Isolated);
        assert_eq!(ids(&sets, SetKind::Isolated), [0, 1, 2, 3]);
    }

    #[test]
    #[should_panic]
    fn test_move_untracked_panics() {
        let mut sets = TrackedSets::new();
        sets.move_to(ObjectId::new(9), SetKind::Staged);
    }
}
