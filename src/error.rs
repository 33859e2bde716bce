// SPDX-License-Identifier: MIT

//! Error types for the openPMD object graph and I/O engine.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by core operations.
///
/// Kinds map 1:1 onto the semantic error kinds named in the design: most
/// are synchronous and returned directly to the caller. `UnsupportedData`
/// is the one kind this crate ever recovers from locally (during
/// `Attributable::read_attributes`).
#[derive(Debug, Error)]
pub enum Error {
    /// Mutation attempted on a Series opened read-only.
    #[error("read-only violation: {0}")]
    ReadOnlyViolation(String),

    /// Attempt to change name, encoding, or format after content was written.
    #[error("immutable after write: {0}")]
    ImmutableAfterWrite(String),

    /// Invalid user configuration at construction time.
    #[error("bad config: {0}")]
    BadConfig(String),

    /// An attribute on disk has an unexpected Datatype, or is missing.
    #[error("bad metadata: {0}")]
    BadMetadata(String),

    /// Operation deliberately unsupported in this version.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// `Attribute::get::<T>()` requested a type that doesn't match the
    /// stored discriminator.
    #[error("type mismatch: attribute stored as {stored}, requested as {requested}")]
    TypeMismatch {
        stored: crate::datatype::Datatype,
        requested: crate::datatype::Datatype,
    },

    /// Lookup of an unknown attribute key.
    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    /// Backend cannot express a non-standard attribute.
    #[error("unsupported data: {0}")]
    UnsupportedData(String),

    /// A backend task failed.
    #[error("backend error: {0}")]
    BackendError(String),

    /// Series is in a state that forbids the requested operation.
    #[error("bad state: {0}")]
    BadState(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
