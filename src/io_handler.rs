// SPDX-License-Identifier: MIT

//! The backend seam: an `AbstractIOHandler` enqueues `IOTask`s and executes
//! them in FIFO order on `flush()`. Grounded on the split between
//! `hdds-recording::format::hdds`'s `Writer`/`Reader` traits and the queue
//! draining in `hdds-recording::recorder::Recorder::flush`: a thin trait at
//! the backend boundary, one concrete in-memory implementation underneath.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::attribute::Attribute;
use crate::error::{Error, Result};
use crate::task::{IOTask, Operation, Parameter};
use crate::writable::FilePosition;

/// How a `Series` may use its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Create,
    ReadOnly,
    ReadWrite,
}

impl AccessType {
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

/// Backend storage format. Only [`Format::Dummy`] is implemented; the rest
/// are accepted by the public API surface (spec.md §6) but rejected by
/// [`create_io_handler`] since concrete HDF5/ADIOS serialization is out of
/// scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Hdf5,
    ParallelHdf5,
    Adios,
    ParallelAdios,
    Adios2,
    ParallelAdios2,
    Dummy,
}

/// Shared handle to a backend, held by every node's `Writable` so siblings
/// can confirm they belong to the same `Series`.
pub type IOHandlerRef = Rc<dyn AbstractIOHandler>;

/// The backend seam every concrete storage engine implements.
pub trait AbstractIOHandler {
    /// Queue a unit of work; no I/O happens until `flush()`.
    fn enqueue(&self, task: IOTask);

    /// Drain the queue in FIFO order, executing each task against the
    /// backend. Stops at the first error encountered and surfaces it,
    /// discarding whatever tasks were still queued behind it.
    fn flush(&self) -> Result<()>;

    fn access_type(&self) -> AccessType;

    /// Root directory this backend reads from or writes into.
    fn directory(&self) -> &Path;

    /// Number of tasks still queued, awaiting the next `flush()`.
    fn pending_task_count(&self) -> usize;
}

struct Node {
    children: BTreeMap<String, FilePosition>,
    attributes: BTreeMap<String, Attribute>,
}

impl Node {
    fn new() -> Self {
        Node {
            children: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }
}

/// In-memory backend: no bytes ever touch disk. Used for this crate's own
/// tests and as the only backend actually wired up end to end; see
/// DESIGN.md for why HDF5/ADIOS stay unimplemented.
pub struct DummyIOHandler {
    directory: PathBuf,
    access: AccessType,
    queue: RefCell<VecDeque<IOTask>>,
    nodes: RefCell<Vec<Node>>,
    recorded: RefCell<Vec<Operation>>,
}

impl DummyIOHandler {
    pub fn new(directory: impl Into<PathBuf>, access: AccessType) -> Rc<Self> {
        Rc::new(DummyIOHandler {
            directory: directory.into(),
            access,
            queue: RefCell::new(VecDeque::new()),
            nodes: RefCell::new(Vec::new()),
            recorded: RefCell::new(Vec::new()),
        })
    }

    /// The operations executed so far, in the order `flush()` ran them.
    /// Exists purely so tests can assert the exact task sequence a flush
    /// produced (spec.md §8, scenario 1).
    pub fn recorded_operations(&self) -> Vec<Operation> {
        self.recorded.borrow().clone()
    }

    fn alloc_node(&self) -> FilePosition {
        let mut nodes = self.nodes.borrow_mut();
        let id = nodes.len() as u64;
        nodes.push(Node::new());
        FilePosition(id)
    }

    fn node_id(pos: Option<FilePosition>, ctx: &str) -> Result<u64> {
        pos.map(|p| p.0)
            .ok_or_else(|| Error::BadState(format!("{ctx}: target has no backend position")))
    }

    /// `CreatePath`/`OpenPath` target the child's own `Writable`; the parent
    /// whose children map gets the new entry is reached through the
    /// `Weak` `parent` link, not the target's own (still unset) position.
    fn parent_node_id(target: &crate::writable::WritableRef, ctx: &str) -> Result<u64> {
        let parent = target
            .borrow()
            .parent
            .clone()
            .ok_or_else(|| Error::BadState(format!("{ctx}: target has no parent link")))?
            .upgrade()
            .ok_or_else(|| Error::BadState(format!("{ctx}: parent was dropped")))?;
        let pos = parent.borrow().abstract_file_position;
        Self::node_id(pos, ctx)
    }

    fn require_writable(&self) -> Result<()> {
        if self.access.is_read_only() {
            Err(Error::ReadOnlyViolation(
                "backend opened read-only".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn execute(&self, task: &IOTask) -> Result<()> {
        match &task.parameter {
            Parameter::CreateFile { .. } => {
                self.require_writable()?;
                let id = self.alloc_node();
                let mut target = task.target.borrow_mut();
                target.abstract_file_position = Some(id);
                target.written = true;
            }
            Parameter::OpenFile { .. } => {
                let id = self.alloc_node();
                let mut target = task.target.borrow_mut();
                target.abstract_file_position = Some(id);
                target.written = true;
            }
            Parameter::CreatePath { path } => {
                self.require_writable()?;
                let parent_id = Self::parent_node_id(&task.target, "CreatePath")?;
                let child_id = self.alloc_node();
                self.nodes.borrow_mut()[parent_id as usize]
                    .children
                    .insert(path.clone(), child_id);
                let mut target = task.target.borrow_mut();
                target.abstract_file_position = Some(child_id);
                target.written = true;
            }
            Parameter::OpenPath { path } => {
                let parent_id = Self::parent_node_id(&task.target, "OpenPath")?;
                let child_id = *self.nodes.borrow()[parent_id as usize]
                    .children
                    .get(path)
                    .ok_or_else(|| Error::BadState(format!("no such path: {path}")))?;
                let mut target = task.target.borrow_mut();
                target.abstract_file_position = Some(child_id);
                target.written = true;
            }
            Parameter::DeletePath => {
                self.require_writable()?;
                let id = Self::node_id(task.target.borrow().abstract_file_position, "DeletePath")?;
                self.nodes.borrow_mut()[id as usize] = Node::new();
            }
            Parameter::ListPaths { paths } => {
                let id = Self::node_id(task.target.borrow().abstract_file_position, "ListPaths")?;
                let names: Vec<String> = self.nodes.borrow()[id as usize]
                    .children
                    .keys()
                    .cloned()
                    .collect();
                *paths.borrow_mut() = Some(names);
            }
            Parameter::WriteAtt { name, value, .. } => {
                self.require_writable()?;
                let id = Self::node_id(task.target.borrow().abstract_file_position, "WriteAtt")?;
                self.nodes.borrow_mut()[id as usize]
                    .attributes
                    .insert(name.clone(), value.clone());
            }
            Parameter::ReadAtt { name, value } => {
                let id = Self::node_id(task.target.borrow().abstract_file_position, "ReadAtt")?;
                let found = self.nodes.borrow()[id as usize].attributes.get(name).cloned();
                *value.borrow_mut() = found;
            }
            Parameter::ListAtts { attributes } => {
                let id = Self::node_id(task.target.borrow().abstract_file_position, "ListAtts")?;
                let names: Vec<String> = self.nodes.borrow()[id as usize]
                    .attributes
                    .keys()
                    .cloned()
                    .collect();
                *attributes.borrow_mut() = Some(names);
            }
            Parameter::DeleteAtt { name } => {
                self.require_writable()?;
                let id = Self::node_id(task.target.borrow().abstract_file_position, "DeleteAtt")?;
                self.nodes.borrow_mut()[id as usize].attributes.remove(name);
            }
        }
        Ok(())
    }
}

impl AbstractIOHandler for DummyIOHandler {
    fn enqueue(&self, task: IOTask) {
        self.queue.borrow_mut().push_back(task);
    }

    fn flush(&self) -> Result<()> {
        loop {
            let task = self.queue.borrow_mut().pop_front();
            let Some(task) = task else { break };
            let op = task.operation();
            let result = self.execute(&task);
            self.recorded.borrow_mut().push(op);
            if let Err(err) = result {
                self.queue.borrow_mut().clear();
                return Err(err);
            }
        }
        Ok(())
    }

    fn access_type(&self) -> AccessType {
        self.access
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    fn pending_task_count(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// Construct the backend named by `format`. Only [`Format::Dummy`] is
/// implemented; every other variant is accepted as a valid configuration
/// value but rejected here, never silently substituted.
pub fn create_io_handler(
    directory: impl Into<PathBuf>,
    access: AccessType,
    format: Format,
) -> Result<IOHandlerRef> {
    match format {
        Format::Dummy => Ok(DummyIOHandler::new(directory, access)),
        other => Err(Error::BackendError(format!(
            "backend not implemented: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writable::Writable;

    #[test]
    fn create_file_then_path_round_trips_position() {
        let handler = DummyIOHandler::new("/tmp/dummy", AccessType::Create);
        let root = Writable::new();
        handler.enqueue(IOTask::new(
            root.clone(),
            Parameter::CreateFile {
                name: "data".to_string(),
            },
        ));
        handler.flush().unwrap();
        assert!(root.borrow().abstract_file_position.is_some());
    }

    #[test]
    fn read_only_rejects_write_att() {
        let handler = DummyIOHandler::new("/tmp/dummy", AccessType::ReadOnly);
        let root = Writable::new();
        root.borrow_mut().abstract_file_position = Some(FilePosition(0));
        handler.nodes.borrow_mut().push(Node::new());
        handler.enqueue(IOTask::new(
            root.clone(),
            Parameter::WriteAtt {
                name: "x".to_string(),
                dtype: crate::datatype::Datatype::Int32,
                value: Attribute::Int32(1),
            },
        ));
        handler.enqueue(IOTask::new(
            root,
            Parameter::WriteAtt {
                name: "y".to_string(),
                dtype: crate::datatype::Datatype::Int32,
                value: Attribute::Int32(2),
            },
        ));
        let err = handler.flush().unwrap_err();
        assert!(matches!(err, Error::ReadOnlyViolation(_)));
        assert_eq!(handler.pending_task_count(), 0);
    }

    #[test]
    fn flush_error_drains_the_queue_instead_of_leaving_it() {
        let handler = DummyIOHandler::new("/tmp/dummy", AccessType::Create);
        let root = Writable::new();
        // No CreateFile/OpenFile enqueued first, so this task has no backend
        // position to resolve and `execute` fails.
        handler.enqueue(IOTask::new(
            root.clone(),
            Parameter::WriteAtt {
                name: "x".to_string(),
                dtype: crate::datatype::Datatype::Int32,
                value: Attribute::Int32(1),
            },
        ));
        handler.enqueue(IOTask::new(
            root,
            Parameter::WriteAtt {
                name: "y".to_string(),
                dtype: crate::datatype::Datatype::Int32,
                value: Attribute::Int32(2),
            },
        ));
        let err = handler.flush().unwrap_err();
        assert!(matches!(err, Error::BadState(_)));
        assert_eq!(handler.pending_task_count(), 0);
    }

    #[test]
    fn list_atts_reports_inserted_keys() {
        let handler = DummyIOHandler::new("/tmp/dummy", AccessType::Create);
        let root = Writable::new();
        handler.enqueue(IOTask::new(
            root.clone(),
            Parameter::CreateFile {
                name: "data".to_string(),
            },
        ));
        handler.enqueue(IOTask::new(
            root.clone(),
            Parameter::WriteAtt {
                name: "openPMD".to_string(),
                dtype: crate::datatype::Datatype::String,
                value: Attribute::String("1.1.0".to_string()),
            },
        ));
        let list_param = Parameter::list_atts();
        let cell = match &list_param {
            Parameter::ListAtts { attributes } => attributes.clone(),
            _ => unreachable!(),
        };
        handler.enqueue(IOTask::new(root, list_param));
        handler.flush().unwrap();
        assert_eq!(cell.borrow().as_ref().unwrap(), &vec!["openPMD".to_string()]);
    }
}
