// SPDX-License-Identifier: MIT

//! `Attributable`: the attribute map every tree node carries, plus the two
//! halves of the attribute synchronization protocol (`flush_attributes`,
//! `read_attributes`). Grounded on `original_source/src/backend/Attributable.cpp`.

use std::collections::{BTreeMap, BTreeSet};

use crate::attribute::Attribute;
use crate::error::{Error, Result};
use crate::io_handler::IOHandlerRef;
use crate::task::{IOTask, Parameter};
use crate::writable::{Writable, WritableRef};

const COMMENT_KEY: &str = "comment";

/// The attribute substrate mixed into every node type (`Series`,
/// `Iteration`, `Group`, and `Container<T>` itself).
pub struct Attributable {
    pub writable: WritableRef,
    attributes: BTreeMap<String, Attribute>,
    /// Keys already flushed to the backend at least once; `read_attributes`
    /// never overwrites a key present here with a value it finds on disk,
    /// since a locally-written value always wins over a stale file read.
    written_attributes: BTreeSet<String>,
}

impl Attributable {
    pub fn new() -> Self {
        Attributable {
            writable: Writable::new(),
            attributes: BTreeMap::new(),
            written_attributes: BTreeSet::new(),
        }
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Attribute>) {
        self.attributes.insert(name.into(), value.into());
        self.writable.borrow_mut().dirty = true;
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Returns `true` iff the entry existed (and was removed); `false` if
    /// there was nothing to delete.
    pub fn delete_attribute(&mut self, name: &str) -> Result<bool> {
        let handler = self.writable.borrow().io_handler.clone();
        if let Some(handler) = &handler {
            if handler.access_type().is_read_only() {
                return Err(Error::ReadOnlyViolation(format!(
                    "cannot delete attribute {name} on a read-only Series"
                )));
            }
            if self.writable.borrow().written {
                handler.enqueue(IOTask::new(
                    self.writable.clone(),
                    Parameter::DeleteAtt {
                        name: name.to_string(),
                    },
                ));
                handler.flush()?;
            }
        }
        self.written_attributes.remove(name);
        Ok(self.attributes.remove(name).is_some())
    }

    pub fn attributes(&self) -> impl Iterator<Item = &String> {
        self.attributes.keys()
    }

    /// Full key/value pairs, used when replicating one node's attribute
    /// set onto another (fileBased flush copies the Series root's
    /// attributes onto each per-iteration file).
    pub fn attribute_entries(&self) -> impl Iterator<Item = (&String, &Attribute)> {
        self.attributes.iter()
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn contains_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn comment(&self) -> Option<&str> {
        match self.attributes.get(COMMENT_KEY) {
            Some(Attribute::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.set_attribute(COMMENT_KEY, comment.into());
    }

    /// Enqueue a `WriteAtt` task for every attribute not yet flushed, then
    /// clear the node's dirty flag. Does not itself call `flush()` on the
    /// handler; callers batch this with the rest of a tree walk first.
    pub fn flush_attributes(&mut self, handler: &IOHandlerRef) -> Result<()> {
        if handler.access_type().is_read_only() {
            if self.attributes.len() != self.written_attributes.len() {
                return Err(Error::ReadOnlyViolation(
                    "cannot write attributes on a read-only Series".to_string(),
                ));
            }
            return Ok(());
        }
        for (name, value) in &self.attributes {
            if self.written_attributes.contains(name) {
                continue;
            }
            handler.enqueue(IOTask::new(
                self.writable.clone(),
                Parameter::WriteAtt {
                    name: name.clone(),
                    dtype: value.dtype(),
                    value: value.clone(),
                },
            ));
        }
        self.written_attributes
            .extend(self.attributes.keys().cloned());
        self.writable.borrow_mut().dirty = false;
        Ok(())
    }

    /// Pull every attribute this node's backend position knows about that
    /// isn't already held locally. A name the backend can't decode into an
    /// [`Attribute`] is logged and skipped rather than failing the whole
    /// read, matching `Attributable::readAttributes`'s `catch` around each
    /// attribute.
    pub fn read_attributes(&mut self, handler: &IOHandlerRef) -> Result<()> {
        let list_param = Parameter::list_atts();
        let names_cell = match &list_param {
            Parameter::ListAtts { attributes } => attributes.clone(),
            _ => unreachable!(),
        };
        handler.enqueue(IOTask::new(self.writable.clone(), list_param));
        handler.flush()?;
        let names = names_cell.borrow_mut().take().unwrap_or_default();

        let locally_written: BTreeSet<String> = self.written_attributes.clone();
        for name in names {
            if locally_written.contains(&name) {
                continue;
            }
            let read_param = Parameter::read_att(name.clone());
            let value_cell = match &read_param {
                Parameter::ReadAtt { value, .. } => value.clone(),
                _ => unreachable!(),
            };
            handler.enqueue(IOTask::new(self.writable.clone(), read_param));
            handler.flush()?;
            match value_cell.borrow_mut().take() {
                Some(value) => {
                    self.attributes.insert(name.clone(), value);
                    self.written_attributes.insert(name);
                }
                None => {
                    tracing::warn!("attribute {name} could not be decoded, skipping");
                }
            }
        }
        Ok(())
    }
}

impl Default for Attributable {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by every node type a `Container<T>` can hold, so the
/// container can link a freshly inserted child's upward parent pointer at
/// itself without the caller having to do it by hand.
pub trait HasWritable {
    fn writable(&self) -> &WritableRef;
}

impl HasWritable for Attributable {
    fn writable(&self) -> &WritableRef {
        &self.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_handler::{AccessType, DummyIOHandler};
    use crate::task::Parameter as P;

    #[test]
    fn set_then_get_round_trips() {
        let mut a = Attributable::new();
        a.set_attribute("openPMD", "1.1.0");
        assert_eq!(
            a.get_attribute("openPMD").unwrap().clone().get::<String>().unwrap(),
            "1.1.0"
        );
    }

    #[test]
    fn comment_accessor_uses_reserved_key() {
        let mut a = Attributable::new();
        a.set_comment("hello");
        assert_eq!(a.comment(), Some("hello"));
        assert!(a.contains_attribute("comment"));
    }

    #[test]
    fn flush_then_read_round_trips_through_backend() {
        let handler: crate::io_handler::IOHandlerRef =
            DummyIOHandler::new("/tmp/dummy", AccessType::Create);
        let mut a = Attributable::new();
        handler.enqueue(IOTask::new(
            a.writable.clone(),
            P::CreateFile {
                name: "data".to_string(),
            },
        ));
        handler.flush().unwrap();

        a.set_attribute("n", 42_i32);
        a.flush_attributes(&handler).unwrap();
        handler.flush().unwrap();

        let mut b = Attributable::new();
        b.writable.borrow_mut().abstract_file_position = a.writable.borrow().abstract_file_position;
        b.read_attributes(&handler).unwrap();
        assert_eq!(b.get_attribute("n").unwrap().clone().get::<i32>().unwrap(), 42);
    }

    #[test]
    fn delete_attribute_reports_whether_the_entry_existed() {
        let mut a = Attributable::new();
        a.set_attribute("n", 1_i32);
        assert!(a.delete_attribute("n").unwrap());
        assert!(!a.delete_attribute("n").unwrap());
    }

    #[test]
    fn delete_attribute_on_read_only_series_is_rejected_before_written() {
        let handler: crate::io_handler::IOHandlerRef =
            DummyIOHandler::new("/tmp/dummy", AccessType::ReadOnly);
        let mut a = Attributable::new();
        a.writable.borrow_mut().io_handler = Some(handler);
        a.set_attribute("n", 1_i32);

        let err = a.delete_attribute("n").unwrap_err();
        assert!(matches!(err, Error::ReadOnlyViolation(_)));
        assert!(a.contains_attribute("n"));
    }

    #[test]
    fn vector_double_attribute_round_trips_through_a_reopened_node() {
        let handler: crate::io_handler::IOHandlerRef =
            DummyIOHandler::new("/tmp/dummy", AccessType::Create);
        let mut a = Attributable::new();
        handler.enqueue(IOTask::new(
            a.writable.clone(),
            P::CreateFile {
                name: "data".to_string(),
            },
        ));
        handler.flush().unwrap();

        a.set_attribute("k", vec![1.0_f64, 2.0]);
        a.flush_attributes(&handler).unwrap();
        handler.flush().unwrap();

        // Stand in for "reopen read-only": a fresh node pointed at the same
        // backend position, reading back through its own `read_attributes`.
        let mut reopened = Attributable::new();
        reopened.writable.borrow_mut().abstract_file_position = a.writable.borrow().abstract_file_position;
        reopened.read_attributes(&handler).unwrap();
        assert_eq!(
            reopened.get_attribute("k").unwrap().clone().get::<Vec<f64>>().unwrap(),
            vec![1.0, 2.0]
        );
    }
}
