//! Type-keyed services handed to resources while they populate

use std::any::{Any, TypeId, type_name};

use rustc_hash::FxHashMap;

use super::error::LoadError;

/// Type-erased map holding at most one value per type.
///
/// The registry owns one of these; resource kinds reach external
/// collaborators (such as the graphics backend) through it.
#[derive(Default)]
pub struct Services {
    entries: FxHashMap<TypeId, Box<dyn Any>>,
}

impl Services {
    /// Create an empty service map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a service, returning the previous value of the same type
    pub fn insert<S: 'static>(&mut self, service: S) -> Option<S> {
        self.entries
            .insert(TypeId::of::<S>(), Box::new(service))
            .and_then(|old| old.downcast::<S>().ok())
            .map(|old| *old)
    }

    /// Get a service by type
    #[must_use]
    pub fn get<S: 'static>(&self) -> Option<&S> {
        self.entries
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.downcast_ref::<S>())
    }

    /// Get a service by type, failing with `MissingService`
    ///
    /// # Errors
    ///
    /// Returns `LoadError::MissingService` if no service of type `S` exists
    pub fn require<S: 'static>(&self) -> Result<&S, LoadError> {
        self.get::<S>()
            .ok_or(LoadError::MissingService(type_name::<S>()))
    }

    /// Check if a service of type `S` is installed
    #[must_use]
    pub fn contains<S: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<S>())
    }
}
