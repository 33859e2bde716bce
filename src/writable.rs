// SPDX-License-Identifier: MIT

//! Per-node synchronization state: backend position, parent link, shared
//! I/O handler, and the `dirty`/`written` flags.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::io_handler::IOHandlerRef;

/// Opaque backend handle allocated on first `CREATE_*`/`OPEN_*` for a node.
///
/// Concrete backends (HDF5, ADIOS, ...) would wrap their own group/dataset
/// id here; the in-memory [`DummyIOHandler`](crate::io_handler::DummyIOHandler)
/// wraps a small integer identifying a node inside its virtual file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilePosition(pub u64);

/// Shared, reference-counted handle to one node's synchronization state.
///
/// Every tree node (`Container`, `Series`, `Iteration`, ...) owns one of
/// these for itself; parent back-links are [`Weak`] references into a
/// sibling node's `WritableRef`, which stays at a stable heap address
/// regardless of where the owning Rust value is moved.
pub type WritableRef = Rc<RefCell<Writable>>;

/// Synchronization state shared by every node in a Series' tree.
///
/// Invariants (see spec §3):
/// - `written ⇒ abstract_file_position.is_some()`
/// - every non-root node's `parent` points to its logical container and
///   shares the root's `io_handler`
/// - a freshly inserted child starts `written = false, dirty = true`
/// - `dirty` is cleared only by a successful attribute flush; `written` is
///   set only by a successful CREATE or OPEN
pub struct Writable {
    pub abstract_file_position: Option<FilePosition>,
    pub parent: Option<Weak<RefCell<Writable>>>,
    pub io_handler: Option<IOHandlerRef>,
    pub dirty: bool,
    pub written: bool,
}

impl Writable {
    /// A freshly constructed node: not yet attached to any tree, not yet
    /// written, but dirty (it has "changes" relative to nothing on disk).
    pub fn new() -> WritableRef {
        Rc::new(RefCell::new(Writable {
            abstract_file_position: None,
            parent: None,
            io_handler: None,
            dirty: true,
            written: false,
        }))
    }

    /// `true` when this node's `parent` is reachable and shares `handler`.
    pub fn shares_handler(&self, handler: &IOHandlerRef) -> bool {
        match &self.io_handler {
            Some(h) => Rc::ptr_eq(h, handler),
            None => false,
        }
    }
}

/// Point `child`'s upward link at `parent`. Backends resolve a
/// `CreatePath`/`OpenPath` task's parent node through this link rather than
/// through the child's own (not yet assigned) backend position.
pub fn link_parent(child: &WritableRef, parent: &WritableRef) {
    child.borrow_mut().parent = Some(Rc::downgrade(parent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_is_dirty_and_unwritten() {
        let w = Writable::new();
        let w = w.borrow();
        assert!(w.dirty);
        assert!(!w.written);
        assert!(w.abstract_file_position.is_none());
        assert!(w.parent.is_none());
    }
}
