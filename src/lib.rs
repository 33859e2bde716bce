// SPDX-License-Identifier: MIT

//! A tree-structured object graph and deferred-I/O engine for openPMD
//! datasets: the `Attributable`/`Writable` substrate every node shares, a
//! generic ordered `Container<T>`, a queue of backend `IOTask`s, and the
//! `Series` that ties them together behind the fileBased/groupBased flush
//! and read protocols.
//!
//! Only an in-memory [`io_handler::DummyIOHandler`] backend is implemented;
//! concrete HDF5/ADIOS serialization is out of scope (see DESIGN.md).

pub mod attribute;
pub mod attributable;
pub mod container;
pub mod datatype;
pub mod error;
pub mod io_handler;
pub mod iteration;
pub mod series;
pub mod task;
pub mod writable;

pub use attribute::Attribute;
pub use attributable::Attributable;
pub use container::Container;
pub use datatype::Datatype;
pub use error::{Error, Result};
pub use io_handler::{create_io_handler, AbstractIOHandler, AccessType, DummyIOHandler, Format};
pub use iteration::{Group, Iteration};
pub use series::{IterationEncoding, Series};
pub use task::{IOTask, Operation, Parameter};
pub use writable::{FilePosition, Writable, WritableRef};
