//! The authoritative id → mirrored object map.
//!
//! Insertion-ordered so update passes visit objects in creation order.
//! Parent links are plain ids resolved through the table; children are
//! found by scanning, which keeps removal trivially consistent.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use smallvec::SmallVec;

use simbridge_core::ActorId;

use crate::actor::MirroredObject;

/// Id → object map with parent/child queries.
#[derive(Debug, Default)]
pub struct MirrorTable {
    objects: IndexMap<ActorId, MirroredObject>,
}

impl MirrorTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `obj` unless its id is already present.
    ///
    /// Returns the object back on collision.
    pub fn insert(&mut self, obj: MirroredObject) -> Result<(), MirroredObject> {
        if self.objects.contains_key(&obj.uid()) {
            return Err(obj);
        }
        self.objects.insert(obj.uid(), obj);
        Ok(())
    }

    /// Whether `id` is mirrored.
    pub fn contains(&self, id: ActorId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Look up an object.
    pub fn get(&self, id: ActorId) -> Option<&MirroredObject> {
        self.objects.get(&id)
    }

    /// All ids, in insertion order.
    pub fn ids(&self) -> Vec<ActorId> {
        self.objects.keys().copied().collect()
    }

    /// Number of mirrored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MirroredObject> {
        self.objects.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut MirroredObject> {
        self.objects.values_mut()
    }

    /// Direct children of `id`.
    pub fn children_of(&self, id: ActorId) -> SmallVec<[ActorId; 8]> {
        self.objects
            .values()
            .filter(|o| o.parent() == Some(id))
            .map(MirroredObject::uid)
            .collect()
    }

    /// `id` and every object whose ancestor chain includes it, children
    /// before parents. Contains just `id` when it is not mirrored.
    pub fn subtree_post_order(&self, id: ActorId) -> Vec<ActorId> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        self.visit(id, &mut seen, &mut out);
        out
    }

    fn visit(&self, id: ActorId, seen: &mut BTreeSet<ActorId>, out: &mut Vec<ActorId>) {
        if !seen.insert(id) {
            return;
        }
        for child in self.children_of(id) {
            self.visit(child, seen, out);
        }
        out.push(id);
    }

    /// Remove `id` and its whole subtree, children first.
    ///
    /// Returns nothing when `id` is not mirrored.
    pub(crate) fn remove_subtree(&mut self, id: ActorId) -> Vec<MirroredObject> {
        if !self.contains(id) {
            return Vec::new();
        }
        self.subtree_post_order(id)
            .into_iter()
            .filter_map(|uid| self.objects.shift_remove(&uid))
            .collect()
    }

    /// Remove everything, in insertion order.
    pub(crate) fn drain(&mut self) -> Vec<MirroredObject> {
        self.objects.drain(..).map(|(_, o)| o).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbridge_core::{ActorInfo, ActorKind};

    fn obj(id: u32, parent: Option<u32>) -> MirroredObject {
        MirroredObject::detached(ActorInfo {
            uid: ActorId::new(id),
            name: id.to_string(),
            type_id: "static.prop".into(),
            kind: ActorKind::Generic,
            parent: parent.map(ActorId::new),
            live: Some(ActorId::new(id)),
            prefix: id.to_string(),
            relative_pose: None,
        })
    }

    fn chain() -> MirrorTable {
        // 1 ─ 2 ─ 3
        //  └─ 4
        // 5
        let mut t = MirrorTable::new();
        for (id, parent) in [(1, None), (2, Some(1)), (3, Some(2)), (4, Some(1)), (5, None)] {
            t.insert(obj(id, parent)).unwrap();
        }
        t
    }

    fn raw(ids: &[ActorId]) -> Vec<u32> {
        ids.iter().map(|i| i.get()).collect()
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut t = chain();
        assert!(t.insert(obj(3, None)).is_err());
        assert_eq!(t.len(), 5);
    }

    #[test]
    fn subtree_lists_children_before_parents() {
        let t = chain();
        assert_eq!(raw(&t.subtree_post_order(ActorId::new(1))), vec![3, 2, 4, 1]);
        assert_eq!(raw(&t.subtree_post_order(ActorId::new(5))), vec![5]);
        assert_eq!(raw(&t.subtree_post_order(ActorId::new(99))), vec![99]);
    }

    #[test]
    fn remove_subtree_takes_grandchildren() {
        let mut t = chain();
        let removed: Vec<u32> = t
            .remove_subtree(ActorId::new(1))
            .iter()
            .map(|o| o.uid().get())
            .collect();
        assert_eq!(removed, vec![3, 2, 4, 1]);
        assert_eq!(raw(&t.ids()), vec![5]);
        assert!(t.remove_subtree(ActorId::new(1)).is_empty());
    }

    #[test]
    fn removal_keeps_insertion_order_of_survivors() {
        let mut t = chain();
        t.remove_subtree(ActorId::new(2));
        assert_eq!(raw(&t.ids()), vec![1, 4, 5]);
        assert_eq!(raw(&t.children_of(ActorId::new(1))), vec![4]);
    }
}
