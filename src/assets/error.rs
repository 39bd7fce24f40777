//! Error types for the resource subsystem

use std::io;

use thiserror::Error;

use super::identity::{ResourceId, ResourceIdentity};

/// Errors surfaced to callers of the registry, libraries and handles.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// No assembly with this name has been registered
    #[error("assembly `{0}` is not registered")]
    AssemblyNotRegistered(String),

    /// An assembly with this name already exists in the store
    #[error("assembly `{0}` is already registered")]
    DuplicateAssembly(String),

    /// The assembly has no blob at the requested path
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceIdentity),

    /// The blob exists but could not be read
    #[error("I/O error reading {identity}: {source}")]
    Io {
        identity: ResourceIdentity,
        #[source]
        source: io::Error,
    },

    /// `populate` failed; nothing was registered
    #[error("failed to load {identity}: {source}")]
    Load {
        identity: ResourceIdentity,
        #[source]
        source: LoadError,
    },

    /// A resource is cached under this identity as a different kind
    #[error("type mismatch for {identity}: requested {requested}, registered as {registered}")]
    TypeMismatch {
        identity: ResourceIdentity,
        requested: &'static str,
        registered: &'static str,
    },

    /// Lookup by identity found nothing
    #[error("no live resource named {0}")]
    NotFound(ResourceIdentity),

    /// Lookup by id found nothing (never assigned, or already destroyed)
    #[error("no live resource with id {0}")]
    StaleId(ResourceId),

    /// `bind` failed; the resource stays registered
    #[error("failed to bind {identity}: {source}")]
    Bind {
        identity: ResourceIdentity,
        #[source]
        source: BindError,
    },

    /// The library was disposed and accepts no further requests
    #[error("resource library has been disposed")]
    LibraryDisposed,

    /// The registry has shut down
    #[error("resource registry has shut down")]
    RegistryClosed,

    /// The handle outlived the resource it points at
    #[error("resource {0} has been released")]
    Released(ResourceIdentity),

    /// The resource is currently borrowed mutably (usually while it binds)
    #[error("resource {0} is busy")]
    Busy(ResourceIdentity),
}

/// Failures raised by a resource kind while populating from its stream.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Reading the stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The content is malformed for this kind
    #[error("decode error: {0}")]
    Decode(String),

    /// The content decoded but violates the kind's invariants
    #[error("invalid content: {0}")]
    Invalid(String),

    /// A service required by the kind was not installed in the registry
    #[error("missing service `{0}`")]
    MissingService(&'static str),

    /// The graphics backend refused to create a native object
    #[error("backend error: {0}")]
    Backend(String),

    /// Opening a sibling blob failed
    #[error("dependency failed: {0}")]
    Dependency(Box<ResourceError>),
}

/// Failures raised while a resource resolves its dependencies.
#[derive(Debug, Error)]
pub enum BindError {
    /// A dependency could not be loaded
    #[error("dependency `{name}` failed: {source}")]
    Dependency {
        name: String,
        #[source]
        source: Box<ResourceError>,
    },

    /// A value refers to a uniform the bound shader does not declare
    #[error("uniform `{uniform}` not found in shader `{shader}`")]
    UnknownUniform { uniform: String, shader: String },

    /// Any other kind-specific failure
    #[error("{0}")]
    Invalid(String),
}

impl BindError {
    /// Wrap a dependency failure for the named dependency
    pub fn dependency(name: impl Into<String>, source: ResourceError) -> Self {
        Self::Dependency {
            name: name.into(),
            source: Box::new(source),
        }
    }
}
