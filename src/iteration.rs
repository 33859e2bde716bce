// SPDX-License-Identifier: MIT

//! `Iteration`: one timestep of a `Series`, and `Group`, the minimal
//! structural stub standing in for the full mesh/particle domain layer.
//!
//! The per-iteration flush/read delegation spec.md leaves unspecified is
//! given concrete shape here (SPEC_FULL.md §3): open or create the
//! iteration's own path, flush its own attributes, then recurse into
//! `meshes` and `particles` the same way `Series` recurses into
//! `iterations`.

use crate::attributable::{Attributable, HasWritable};
use crate::container::Container;
use crate::error::Result;
use crate::io_handler::IOHandlerRef;
use crate::task::{IOTask, Parameter};
use crate::writable::WritableRef;

/// A structural placeholder for a mesh or particle species record: carries
/// attributes and a backend position but no grid/record semantics of its
/// own. The mesh/particle domain layer is out of scope; the container
/// nesting it exercises (three `CREATE_PATH`/`OPEN_PATH` levels deep) is
/// not.
#[derive(Default)]
pub struct Group {
    pub base: Attributable,
}

impl Group {
    pub fn new() -> Self {
        Group {
            base: Attributable::new(),
        }
    }
}

impl HasWritable for Group {
    fn writable(&self) -> &WritableRef {
        &self.base.writable
    }
}

/// One timestep. Owns its own attributes plus the `meshes` and `particles`
/// containers that hold that timestep's records.
pub struct Iteration {
    pub base: Attributable,
    pub meshes: Container<Group, String>,
    pub particles: Container<Group, String>,
}

impl Iteration {
    pub fn new() -> Self {
        let base = Attributable::new();
        let meshes = Container::new();
        let particles = Container::new();
        crate::writable::link_parent(&meshes.base.writable, &base.writable);
        crate::writable::link_parent(&particles.base.writable, &base.writable);
        Iteration {
            base,
            meshes,
            particles,
        }
    }

    fn flush_subcontainer(
        container: &mut Container<Group, String>,
        sub_path: &str,
        handler: &IOHandlerRef,
    ) -> Result<()> {
        if container.is_empty() {
            return Ok(());
        }
        if container.base.writable.borrow().abstract_file_position.is_none() {
            handler.enqueue(IOTask::new(
                container.base.writable.clone(),
                Parameter::CreatePath {
                    path: sub_path.to_string(),
                },
            ));
            handler.flush()?;
        }
        container.flush(handler, |key, group, handler| {
            if group.base.writable.borrow().abstract_file_position.is_none() {
                handler.enqueue(IOTask::new(
                    group.base.writable.clone(),
                    Parameter::CreatePath {
                        path: key.clone(),
                    },
                ));
                handler.flush()?;
            }
            group.base.flush_attributes(handler)?;
            handler.flush()
        })
    }

    /// Flush this iteration's own attributes, then its `meshes` and
    /// `particles` containers, under a groupBased iteration path that has
    /// already been created/opened by the caller.
    pub fn flush_group_based(&mut self, meshes_path: &str, particles_path: &str, handler: &IOHandlerRef) -> Result<()> {
        if self.base.writable.borrow().dirty {
            self.base.flush_attributes(handler)?;
            handler.flush()?;
        }
        Self::flush_subcontainer(&mut self.meshes, meshes_path, handler)?;
        Self::flush_subcontainer(&mut self.particles, particles_path, handler)?;
        Ok(())
    }

    /// Identical delegation for the fileBased case; the difference between
    /// the two encodings lives entirely in how `Series` names and creates
    /// the backing file, not in how an iteration flushes its own content.
    pub fn flush_file_based(&mut self, meshes_path: &str, particles_path: &str, handler: &IOHandlerRef) -> Result<()> {
        self.flush_group_based(meshes_path, particles_path, handler)
    }

    /// Read this iteration's own attributes, then descend into `meshes`
    /// and `particles`.
    pub fn read(&mut self, meshes_path: &str, particles_path: &str, handler: &IOHandlerRef) -> Result<()> {
        self.base.read_attributes(handler)?;
        for (sub_path, container) in [
            (meshes_path, &mut self.meshes),
            (particles_path, &mut self.particles),
        ] {
            let open_path = Parameter::OpenPath {
                path: sub_path.to_string(),
            };
            handler.enqueue(IOTask::new(container.base.writable.clone(), open_path));
            if handler.flush().is_err() {
                continue;
            }
            let list_param = Parameter::list_paths();
            let names_cell = match &list_param {
                Parameter::ListPaths { paths } => paths.clone(),
                _ => unreachable!(),
            };
            handler.enqueue(IOTask::new(container.base.writable.clone(), list_param));
            handler.flush()?;
            let names = names_cell.borrow_mut().take().unwrap_or_default();
            for name in names {
                let group = container.get_or_insert(name.clone(), Group::new);
                handler.enqueue(IOTask::new(
                    group.base.writable.clone(),
                    Parameter::OpenPath { path: name },
                ));
                handler.flush()?;
                group.base.read_attributes(handler)?;
            }
        }
        Ok(())
    }
}

impl Default for Iteration {
    fn default() -> Self {
        Self::new()
    }
}

impl HasWritable for Iteration {
    fn writable(&self) -> &WritableRef {
        &self.base.writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_handler::{AccessType, DummyIOHandler};
    use crate::task::Parameter as P;

    #[test]
    fn flush_with_no_meshes_or_particles_only_writes_own_attributes() {
        let handler: IOHandlerRef = DummyIOHandler::new("/tmp/dummy", AccessType::Create);
        let mut it = Iteration::new();
        handler.enqueue(IOTask::new(
            it.base.writable.clone(),
            P::CreateFile {
                name: "data".to_string(),
            },
        ));
        handler.flush().unwrap();
        it.base.set_attribute("dt", 0.1_f32);
        it.flush_group_based("meshes", "particles", &handler).unwrap();
        assert!(!it.base.writable.borrow().dirty);
    }
}
