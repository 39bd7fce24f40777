//! The contract every resource kind implements
//!
//! A resource goes through three hooks:
//! - `populate` runs once, right after construction, before any token exists
//! - `bind` runs once, through the first library that obtains the resource
//! - `teardown` runs once, when the last token is released
//!
//! Populate and teardown are the only places a kind may touch external
//! state such as GPU handles.

use std::any::{Any, TypeId, type_name};
use std::cell::{Cell, RefCell};

use super::assembly::{AssemblyHandle, ResourceStream};
use super::error::{BindError, LoadError};
use super::identity::{ResourceId, ResourceIdentity};
use super::library::ResourceLibrary;
use super::services::Services;
use super::token::ReferenceToken;

/// Access to `self` as [`Any`], implemented for every sized `'static` type
pub trait AsAny: Any {
    /// Borrow as `&dyn Any`
    fn as_any(&self) -> &dyn Any;

    /// Borrow as `&mut dyn Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Materialized content loaded from one blob.
///
/// Kinds are constructed with `Default` by the registry and then populated
/// from their stream. A kind that depends on other resources resolves them in
/// [`Resource::bind`] by acquiring its own tokens through the library, so
/// dependency lifetimes follow the same counting rules as everything else.
///
/// # Examples
///
/// ```
/// use resource_engine::assets::{LoadError, PopulateContext, Resource, ResourceStream};
///
/// #[derive(Default)]
/// struct Script {
///     source: String,
/// }
///
/// impl Resource for Script {
///     fn populate(
///         &mut self,
///         stream: &mut ResourceStream,
///         _ctx: &PopulateContext<'_>,
///     ) -> Result<(), LoadError> {
///         self.source = stream.read_text()?;
///         Ok(())
///     }
///
///     fn teardown(&mut self) {}
/// }
/// ```
pub trait Resource: AsAny {
    /// First-phase initialization from the blob.
    ///
    /// Must consume the stream and leave the payload usable. A failure
    /// aborts the load and nothing is registered.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] describing why the content was rejected
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError>;

    /// Second-phase initialization, run through the first library that
    /// obtains this resource. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns a [`BindError`]; the resource stays registered regardless
    fn bind(&mut self, _ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    /// Release native state. Runs exactly once, when the reference count
    /// reaches zero.
    fn teardown(&mut self);
}

/// Short type name used in diagnostics
pub(crate) fn kind_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

pub(crate) fn downcast_ref<T: Resource>(resource: &dyn Resource) -> Option<&T> {
    AsAny::as_any(resource).downcast_ref::<T>()
}

pub(crate) fn downcast_mut<T: Resource>(resource: &mut dyn Resource) -> Option<&mut T> {
    AsAny::as_any_mut(resource).downcast_mut::<T>()
}

/// Storage cell shared by the registry, tokens and handles.
///
/// The payload is taken out when the resource is torn down; handles that
/// outlive it observe `None`. A slot retired while borrowed keeps its payload
/// until the last borrow guard drops.
pub(crate) struct ResourceSlot {
    pub(crate) id: ResourceId,
    pub(crate) identity: ResourceIdentity,
    pub(crate) kind: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) resource: RefCell<Option<Box<dyn Resource>>>,
    retired: Cell<bool>,
}

impl ResourceSlot {
    pub(crate) fn new<T: Resource>(id: ResourceId, identity: ResourceIdentity, resource: T) -> Self {
        Self {
            id,
            identity,
            kind: kind_name::<T>(),
            type_id: TypeId::of::<T>(),
            resource: RefCell::new(Some(Box::new(resource))),
            retired: Cell::new(false),
        }
    }

    /// Tear the payload down now, or as soon as the last borrow ends.
    /// Returns `false` if it had to wait.
    pub(crate) fn retire(&self) -> bool {
        self.retired.set(true);
        self.finish_retired()
    }

    /// Run a teardown that was blocked by a borrow, once nothing holds one
    pub(crate) fn finish_retired(&self) -> bool {
        if !self.retired.get() {
            return false;
        }

        let taken = match self.resource.try_borrow_mut() {
            Ok(mut resource) => resource.take(),
            Err(_) => return false,
        };
        if let Some(mut resource) = taken {
            resource.teardown();
        }
        true
    }

    pub(crate) fn is<T: Resource>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.resource
            .try_borrow()
            .map_or(true, |resource| resource.is_some())
    }
}

impl Drop for ResourceSlot {
    fn drop(&mut self) {
        if let Some(mut resource) = self.resource.get_mut().take() {
            resource.teardown();
        }
    }
}

/// What `populate` can see besides its stream
pub struct PopulateContext<'a> {
    identity: &'a ResourceIdentity,
    services: &'a Services,
}

impl<'a> PopulateContext<'a> {
    pub(crate) fn new(identity: &'a ResourceIdentity, services: &'a Services) -> Self {
        Self { identity, services }
    }

    /// Identity of the resource being populated
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        self.identity
    }

    /// The assembly the resource comes from
    #[must_use]
    pub fn assembly(&self) -> &AssemblyHandle {
        self.identity.assembly()
    }

    /// Open another blob from the same assembly
    ///
    /// # Errors
    ///
    /// Wraps the lookup failure in `LoadError::Dependency`
    pub fn open(&self, path: &str) -> Result<ResourceStream, LoadError> {
        self.assembly()
            .open(path)
            .map_err(|e| LoadError::Dependency(Box::new(e)))
    }

    /// Get a registry service by type
    #[must_use]
    pub fn service<S: 'static>(&self) -> Option<&S> {
        self.services.get::<S>()
    }

    /// Get a registry service by type, failing if absent
    ///
    /// # Errors
    ///
    /// Returns `LoadError::MissingService` if no such service is installed
    pub fn require<S: 'static>(&self) -> Result<&S, LoadError> {
        self.services.require::<S>()
    }
}

/// What `bind` can see: the identity and the library doing the binding
pub struct BindContext<'a> {
    identity: &'a ResourceIdentity,
    library: &'a mut ResourceLibrary,
}

impl<'a> BindContext<'a> {
    pub(crate) fn new(identity: &'a ResourceIdentity, library: &'a mut ResourceLibrary) -> Self {
        Self { identity, library }
    }

    /// Identity of the resource being bound
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        self.identity
    }

    /// The assembly the resource comes from
    #[must_use]
    pub fn assembly(&self) -> &AssemblyHandle {
        self.identity.assembly()
    }

    /// The library performing the bind
    pub fn library(&mut self) -> &mut ResourceLibrary {
        self.library
    }

    /// Acquire an owned token on `name` from the same assembly, through the
    /// binding library
    ///
    /// # Errors
    ///
    /// Wraps any load failure in `BindError::Dependency`
    pub fn acquire<T: Resource + Default>(
        &mut self,
        name: &str,
    ) -> Result<ReferenceToken<T>, BindError> {
        let assembly = self.identity.assembly().clone();
        self.acquire_from(&assembly, name)
    }

    /// Acquire an owned token on `name` from another assembly
    ///
    /// # Errors
    ///
    /// Wraps any load failure in `BindError::Dependency`
    pub fn acquire_from<T: Resource + Default>(
        &mut self,
        assembly: &AssemblyHandle,
        name: &str,
    ) -> Result<ReferenceToken<T>, BindError> {
        self.library
            .acquire::<T>(assembly, name)
            .map_err(|e| BindError::dependency(name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Blank;

    impl Resource for Blank {
        fn populate(
            &mut self,
            _stream: &mut ResourceStream,
            _ctx: &PopulateContext<'_>,
        ) -> Result<(), LoadError> {
            Ok(())
        }

        fn teardown(&mut self) {}
    }

    #[derive(Default)]
    struct Other;

    impl Resource for Other {
        fn populate(
            &mut self,
            _stream: &mut ResourceStream,
            _ctx: &PopulateContext<'_>,
        ) -> Result<(), LoadError> {
            Ok(())
        }

        fn teardown(&mut self) {}
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let boxed: Box<dyn Resource> = Box::new(Blank);
        assert!(downcast_ref::<Blank>(boxed.as_ref()).is_some());
        assert!(downcast_ref::<Other>(boxed.as_ref()).is_none());
    }

    #[test]
    fn test_kind_name_is_short() {
        assert_eq!(kind_name::<Blank>(), "Blank");
    }

    /// Counts teardowns through a shared cell
    #[derive(Default)]
    struct Counted(std::rc::Rc<Cell<u32>>);

    impl Resource for Counted {
        fn populate(
            &mut self,
            _stream: &mut ResourceStream,
            _ctx: &PopulateContext<'_>,
        ) -> Result<(), LoadError> {
            Ok(())
        }

        fn teardown(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn counted_slot() -> (ResourceSlot, std::rc::Rc<Cell<u32>>) {
        let mut store = crate::assets::AssemblyStore::new();
        let assembly = store
            .register("slots", crate::assets::EmbeddedSource::new())
            .unwrap();
        let teardowns = std::rc::Rc::new(Cell::new(0));
        let slot = ResourceSlot::new(
            ResourceId::new(0),
            ResourceIdentity::new(&assembly, "a"),
            Counted(teardowns.clone()),
        );
        (slot, teardowns)
    }

    #[test]
    fn test_retire_waits_for_borrow() {
        let (slot, teardowns) = counted_slot();

        let borrowed = slot.resource.borrow();
        assert!(!slot.retire());
        assert_eq!(teardowns.get(), 0);
        drop(borrowed);

        assert!(slot.finish_retired());
        assert_eq!(teardowns.get(), 1);
        assert!(!slot.is_alive());

        drop(slot);
        assert_eq!(teardowns.get(), 1);
    }

    #[test]
    fn test_dropping_live_slot_tears_down_once() {
        let (slot, teardowns) = counted_slot();
        assert!(!slot.finish_retired());
        assert_eq!(teardowns.get(), 0);

        drop(slot);
        assert_eq!(teardowns.get(), 1);
    }
}
