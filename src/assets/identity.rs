//! Resource identifiers

use std::fmt;
use std::hash::{Hash, Hasher};

use super::assembly::AssemblyHandle;

/// Numeric id of a live resource, unique within its registry.
///
/// Ids are assigned monotonically and never reused while the registry lives,
/// so a stale id is rejected instead of aliasing a newer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value
    #[must_use]
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Composite key naming a resource: the assembly it comes from and its
/// logical path inside that assembly.
///
/// Two assemblies may use the same relative path; the assembly is part of
/// the key.
#[derive(Debug, Clone)]
pub struct ResourceIdentity {
    assembly: AssemblyHandle,
    path: String,
}

impl ResourceIdentity {
    /// Create an identity for `path` inside `assembly`
    #[must_use]
    pub fn new(assembly: &AssemblyHandle, path: impl Into<String>) -> Self {
        Self {
            assembly: assembly.clone(),
            path: path.into(),
        }
    }

    /// The assembly this resource comes from
    #[must_use]
    pub fn assembly(&self) -> &AssemblyHandle {
        &self.assembly
    }

    /// The logical path inside the assembly
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PartialEq for ResourceIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.assembly.id() == other.assembly.id() && self.path == other.path
    }
}

impl Eq for ResourceIdentity {}

impl Hash for ResourceIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.assembly.id().hash(state);
        self.path.hash(state);
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.assembly.name(), self.path)
    }
}
