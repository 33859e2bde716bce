// SPDX-License-Identifier: MIT

//! Deferred I/O operations: the `Operation` tag, the `Parameter` payload for
//! each one, and the `IOTask` that bundles a target node with its parameter.
//!
//! Mirrors the task/parameter shape visible at the enqueue sites in
//! `original_source/src/Series.cpp` (each flush/read step builds a tagged
//! operation against a target node, then drains the queue). Rust has no
//! out-parameters, so parameters whose C++ counterpart
//! is mutated in place by the backend carry an `Rc<RefCell<Option<T>>>`
//! output cell instead; callers read it back after `flush()` drains the
//! queue. Position outputs (`CREATE_FILE`/`OPEN_FILE`/`CREATE_PATH`/
//! `OPEN_PATH`) need no such cell: the backend writes directly onto the
//! task's `target.borrow_mut().abstract_file_position`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::attribute::Attribute;
use crate::datatype::Datatype;
use crate::writable::WritableRef;

/// The ten backend operations a `Series` can enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFile,
    OpenFile,
    CreatePath,
    OpenPath,
    DeletePath,
    ListPaths,
    WriteAtt,
    ReadAtt,
    ListAtts,
    DeleteAtt,
}

/// An output cell: `None` until the backend fills it in during `flush()`.
pub type OutCell<T> = Rc<RefCell<Option<T>>>;

fn out_cell<T>() -> OutCell<T> {
    Rc::new(RefCell::new(None))
}

/// Payload for one [`Operation`]. Variant name matches the operation it
/// belongs to.
#[derive(Clone)]
pub enum Parameter {
    CreateFile {
        name: String,
    },
    OpenFile {
        name: String,
    },
    CreatePath {
        path: String,
    },
    OpenPath {
        path: String,
    },
    DeletePath,
    ListPaths {
        paths: OutCell<Vec<String>>,
    },
    WriteAtt {
        name: String,
        dtype: Datatype,
        value: Attribute,
    },
    ReadAtt {
        name: String,
        value: OutCell<Attribute>,
    },
    ListAtts {
        attributes: OutCell<Vec<String>>,
    },
    DeleteAtt {
        name: String,
    },
}

impl Parameter {
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateFile { .. } => Operation::CreateFile,
            Self::OpenFile { .. } => Operation::OpenFile,
            Self::CreatePath { .. } => Operation::CreatePath,
            Self::OpenPath { .. } => Operation::OpenPath,
            Self::DeletePath => Operation::DeletePath,
            Self::ListPaths { .. } => Operation::ListPaths,
            Self::WriteAtt { .. } => Operation::WriteAtt,
            Self::ReadAtt { .. } => Operation::ReadAtt,
            Self::ListAtts { .. } => Operation::ListAtts,
            Self::DeleteAtt { .. } => Operation::DeleteAtt,
        }
    }

    pub fn list_paths() -> Self {
        Self::ListPaths { paths: out_cell() }
    }

    pub fn read_att(name: impl Into<String>) -> Self {
        Self::ReadAtt {
            name: name.into(),
            value: out_cell(),
        }
    }

    pub fn list_atts() -> Self {
        Self::ListAtts { attributes: out_cell() }
    }
}

/// One unit of deferred work: a target node plus the parameters for one
/// operation against it. Enqueued on an `AbstractIOHandler`, executed in
/// FIFO order by `flush()`.
pub struct IOTask {
    pub target: WritableRef,
    pub parameter: Parameter,
}

impl IOTask {
    pub fn new(target: WritableRef, parameter: Parameter) -> Self {
        IOTask { target, parameter }
    }

    pub fn operation(&self) -> Operation {
        self.parameter.operation()
    }
}
