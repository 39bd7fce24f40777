//! Resource identity, registry and scoped libraries
//!
//! Provides:
//! - Named assemblies that serve raw blobs by path
//! - A registry that keeps at most one live instance per (assembly, path)
//! - Move-only reference tokens with exact counting
//! - Libraries that scope a set of resources and release them together
//! - Lifecycle notifications

mod assembly;
mod error;
mod events;
mod handle;
mod identity;
mod library;
mod registry;
mod resource;
mod services;
mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use assembly::{
    AssemblyHandle, AssemblyId, AssemblySource, AssemblyStore, DirectorySource, EmbeddedSource,
    ResourceStream,
};
pub use error::{BindError, LoadError, ResourceError};
pub use events::{ObserverId, ResourceEvent, ResourceEventKind};
pub use handle::{ResourceHandle, ResourceRef, ResourceRefMut};
pub use identity::{ResourceId, ResourceIdentity};
pub use library::{LibraryId, LibraryState, ResourceLibrary};
pub use registry::Registry;
pub use resource::{AsAny, BindContext, PopulateContext, Resource};
pub use services::Services;
pub use token::{ReferenceToken, UntypedToken};
