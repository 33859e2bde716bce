// SPDX-License-Identifier: MIT

//! `Container<T, K>`: an ordered, attribute-bearing map of child nodes.
//! Grounded on `original_source/include/backend/Container.hpp`, with the
//! registry-of-entities shape also seen in
//! `hdds::dds::domain_registry`/`local_registry`.

use std::collections::BTreeMap;
use std::collections::btree_map::{Iter, IterMut, Keys};

use crate::attributable::{Attributable, HasWritable};
use crate::error::{Error, Result};
use crate::io_handler::IOHandlerRef;
use crate::task::{IOTask, Parameter};
use crate::writable::{link_parent, WritableRef};

/// An ordered collection of child nodes of type `T`, keyed by `K`.
///
/// `BTreeMap` gives lexicographic ordering for `String` keys and numeric
/// ordering for integer keys directly, satisfying the ordering policy
/// without a bespoke insertion-order tracker.
pub struct Container<T, K = String>
where
    K: Ord,
{
    pub base: Attributable,
    children: BTreeMap<K, T>,
}

impl<T, K: Ord + Clone + ToString> Container<T, K> {
    pub fn new() -> Self {
        Container {
            base: Attributable::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.children.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.children.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut T> {
        self.children.get_mut(key)
    }

    pub fn keys(&self) -> Keys<'_, K, T> {
        self.children.keys()
    }

    pub fn iter(&self) -> Iter<'_, K, T> {
        self.children.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, T> {
        self.children.iter_mut()
    }

    /// Remove a child from the local tree and, if the Series has already
    /// been written to, enqueue the matching `DeletePath`. Read-only
    /// Series reject this outright and the backend queue stays untouched.
    pub fn erase(&mut self, key: &K, child_writable: &WritableRef) -> Result<Option<T>> {
        let handler = self.base.writable.borrow().io_handler.clone();
        if let Some(handler) = &handler {
            if handler.access_type().is_read_only() {
                return Err(Error::ReadOnlyViolation(format!(
                    "cannot erase {} from a read-only Series",
                    key.to_string()
                )));
            }
            if child_writable.borrow().written {
                handler.enqueue(IOTask::new(child_writable.clone(), Parameter::DeletePath));
            }
        }
        Ok(self.children.remove(key))
    }

    /// Remove every child without the read-only/already-written guards
    /// `clear()` enforces. For internal use repopulating a container
    /// during a re-read, where the container is being rebuilt from the
    /// backend's own enumeration rather than emptied by user request.
    pub(crate) fn clear_unchecked(&mut self) {
        self.children.clear();
    }

    /// Remove every child at once. Rejected on a read-only Series, and
    /// rejected as not-implemented if this container itself has already
    /// been written — clearing a written container means deleting and
    /// recreating its backend path, which no concrete backend here
    /// exercises.
    pub fn clear(&mut self) -> Result<()> {
        if let Some(handler) = self.base.writable.borrow().io_handler.clone() {
            if handler.access_type().is_read_only() {
                return Err(Error::ReadOnlyViolation(
                    "cannot clear a container on a read-only Series".to_string(),
                ));
            }
        }
        if self.base.writable.borrow().written {
            return Err(Error::NotImplemented(
                "clearing an already-written container".to_string(),
            ));
        }
        self.children.clear();
        Ok(())
    }

    /// Flush this container's own attributes if dirty, then hand every
    /// child to `flush_child` in key order.
    ///
    /// `flush_child` does the type-specific work: creating or opening the
    /// child's own path, writing its attributes, recursing into whatever
    /// sub-containers it owns. This method only handles what's common to
    /// every `Container<T>` — its own attribute flush and the iteration
    /// order.
    pub fn flush<F>(&mut self, handler: &IOHandlerRef, mut flush_child: F) -> Result<()>
    where
        F: FnMut(&K, &mut T, &IOHandlerRef) -> Result<()>,
    {
        if self.base.writable.borrow().dirty {
            self.base.flush_attributes(handler)?;
            handler.flush()?;
        }
        for (key, child) in self.children.iter_mut() {
            flush_child(key, child, handler)?;
        }
        Ok(())
    }
}

impl<T: HasWritable, K: Ord + Clone + ToString> Container<T, K> {
    /// Returns the existing child if present, otherwise inserts
    /// `default()`'s result with its parent pointer linked at this
    /// container. Mirrors `Container::operator[]`'s auto-vivifying lookup.
    pub fn get_or_insert(&mut self, key: K, default: impl FnOnce() -> T) -> &mut T {
        let parent = self.base.writable.clone();
        self.children.entry(key).or_insert_with(|| {
            let child = default();
            link_parent(child.writable(), &parent);
            child
        })
    }

    /// Insert `value` under `key`, linking its parent pointer at this
    /// container so a later `CreatePath`/`OpenPath` against it resolves
    /// through here.
    pub fn insert(&mut self, key: K, value: T) -> Option<T> {
        link_parent(value.writable(), &self.base.writable);
        self.children.insert(key, value)
    }
}

impl<T, K: Ord + Clone + ToString> Default for Container<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf(i32, WritableRef);

    impl Leaf {
        fn new(v: i32) -> Self {
            Leaf(v, crate::writable::Writable::new())
        }
    }

    impl Default for Leaf {
        fn default() -> Self {
            Leaf::new(0)
        }
    }

    impl HasWritable for Leaf {
        fn writable(&self) -> &WritableRef {
            &self.1
        }
    }

    #[test]
    fn get_or_insert_auto_vivifies() {
        let mut c: Container<Leaf, String> = Container::new();
        c.get_or_insert("a".to_string(), Leaf::default).0 = 7;
        assert_eq!(c.get(&"a".to_string()).unwrap().0, 7);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn get_or_insert_links_child_parent_to_container() {
        let mut c: Container<Leaf, String> = Container::new();
        let leaf = c.get_or_insert("a".to_string(), Leaf::default);
        let parent = leaf.1.borrow().parent.clone().unwrap().upgrade().unwrap();
        assert!(std::rc::Rc::ptr_eq(&parent, &c.base.writable));
    }

    #[test]
    fn numeric_keys_iterate_in_numeric_order() {
        let mut c: Container<Leaf, u64> = Container::new();
        c.insert(10, Leaf::new(1));
        c.insert(0, Leaf::new(2));
        c.insert(5, Leaf::new(3));
        let keys: Vec<u64> = c.keys().copied().collect();
        assert_eq!(keys, vec![0, 5, 10]);
    }

    #[test]
    fn clear_on_read_only_series_is_rejected() {
        use crate::io_handler::{AccessType, DummyIOHandler};

        let handler: IOHandlerRef = DummyIOHandler::new("/tmp/dummy", AccessType::ReadOnly);
        let mut c: Container<Leaf, String> = Container::new();
        c.base.writable.borrow_mut().io_handler = Some(handler);
        c.insert("a".to_string(), Leaf::new(1));

        let err = c.clear().unwrap_err();
        assert!(matches!(err, Error::ReadOnlyViolation(_)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn clear_on_written_container_is_not_implemented() {
        let mut c: Container<Leaf, String> = Container::new();
        c.insert("a".to_string(), Leaf::new(1));
        c.base.writable.borrow_mut().written = true;

        let err = c.clear().unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn clear_removes_all_children() {
        let mut c: Container<Leaf, String> = Container::new();
        c.insert("a".to_string(), Leaf::new(1));
        c.insert("b".to_string(), Leaf::new(2));
        c.clear().unwrap();
        assert!(c.is_empty());
    }

    #[test]
    fn erase_on_read_only_series_is_rejected_and_queue_stays_empty() {
        use crate::io_handler::{AccessType, DummyIOHandler};
        use crate::writable::Writable;

        let handler: IOHandlerRef = DummyIOHandler::new("/tmp/dummy", AccessType::ReadOnly);
        let mut c: Container<Leaf, String> = Container::new();
        c.base.writable.borrow_mut().io_handler = Some(handler.clone());
        let child_writable = Writable::new();
        child_writable.borrow_mut().written = true;
        c.insert("a".to_string(), Leaf::new(1));

        let err = c.erase(&"a".to_string(), &child_writable).unwrap_err();
        assert!(matches!(err, Error::ReadOnlyViolation(_)));
        assert!(c.contains_key(&"a".to_string()));
        assert_eq!(handler.pending_task_count(), 0);
    }
}
