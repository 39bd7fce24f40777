//! The resource registry: identity cache and reference-count authority
//!
//! The registry is the only writer of its id and identity tables. Every
//! compound transition (look up or create, decrement and maybe destroy) runs
//! while the table borrow is held; hooks that run user code (`populate`,
//! `teardown`) and observer notifications run after it is released, so they
//! may call back into the registry.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::assembly::AssemblyHandle;
use super::error::ResourceError;
use super::events::{EventHub, ObserverId, ResourceEvent, ResourceEventKind};
use super::handle::ResourceHandle;
use super::identity::{ResourceId, ResourceIdentity};
use super::library::{LibraryId, ResourceLibrary};
use super::resource::{PopulateContext, Resource, ResourceSlot, kind_name};
use super::services::Services;
use super::token::ReferenceToken;

/// Registry-side bookkeeping for one live resource
struct Entry {
    slot: Rc<ResourceSlot>,
    /// Number of live tokens
    references: u32,
    /// Set once the first library has run `bind`
    bound: bool,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    by_id: FxHashMap<ResourceId, Entry>,
    by_identity: FxHashMap<ResourceIdentity, ResourceId>,
    closed: bool,
}

/// State shared between the registry, its tokens and its libraries
#[derive(Default)]
pub(crate) struct RegistryShared {
    state: RefCell<RegistryState>,
    services: RefCell<Services>,
    events: EventHub,
    next_library_id: Cell<u64>,
}

impl RegistryShared {
    pub(crate) fn load<T: Resource + Default>(
        this: &Rc<Self>,
        assembly: &AssemblyHandle,
        path: &str,
    ) -> Result<ReferenceToken<T>, ResourceError> {
        let identity = ResourceIdentity::new(assembly, path);
        if let Some(slot) = this.retain_existing::<T>(&identity)? {
            return Ok(ReferenceToken::new(slot, Rc::downgrade(this)));
        }

        let mut stream = assembly.open(path)?;
        let mut resource = T::default();
        {
            let services = this.services.borrow();
            let ctx = PopulateContext::new(&identity, &services);
            resource
                .populate(&mut stream, &ctx)
                .map_err(|source| ResourceError::Load {
                    identity: identity.clone(),
                    source,
                })?;
        }

        if !stream.is_consumed() {
            log::warn!(
                "{} left {} byte(s) of {} unread",
                kind_name::<T>(),
                stream.remaining(),
                identity
            );
        }

        let slot = this.insert(identity, resource)?;
        Ok(ReferenceToken::new(slot, Rc::downgrade(this)))
    }

    pub(crate) fn acquire<T: Resource>(
        this: &Rc<Self>,
        id: ResourceId,
    ) -> Result<ReferenceToken<T>, ResourceError> {
        let slot = {
            let mut state = this.state.borrow_mut();
            if state.closed {
                return Err(ResourceError::RegistryClosed);
            }
            let entry = state
                .by_id
                .get_mut(&id)
                .ok_or(ResourceError::StaleId(id))?;
            check_kind::<T>(&entry.slot)?;
            entry.references += 1;
            Rc::clone(&entry.slot)
        };

        this.notify(ResourceEventKind::Got, &slot);
        Ok(ReferenceToken::new(slot, Rc::downgrade(this)))
    }

    /// Count one more claim on an existing resource, if there is one
    fn retain_existing<T: Resource>(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<Option<Rc<ResourceSlot>>, ResourceError> {
        let slot = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return Err(ResourceError::RegistryClosed);
            }
            let Some(id) = state.by_identity.get(identity).copied() else {
                return Ok(None);
            };
            let Some(entry) = state.by_id.get_mut(&id) else {
                return Ok(None);
            };
            check_kind::<T>(&entry.slot)?;
            entry.references += 1;
            Rc::clone(&entry.slot)
        };

        self.notify(ResourceEventKind::Got, &slot);
        Ok(Some(slot))
    }

    fn insert<T: Resource>(
        &self,
        identity: ResourceIdentity,
        mut resource: T,
    ) -> Result<Rc<ResourceSlot>, ResourceError> {
        let slot = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                drop(state);
                resource.teardown();
                return Err(ResourceError::RegistryClosed);
            }

            let id = ResourceId::new(state.next_id);
            state.next_id += 1;

            let slot = Rc::new(ResourceSlot::new(id, identity.clone(), resource));
            state.by_identity.insert(identity, id);
            state.by_id.insert(
                id,
                Entry {
                    slot: Rc::clone(&slot),
                    references: 1,
                    bound: false,
                },
            );
            slot
        };

        self.notify(ResourceEventKind::Loaded, &slot);
        Ok(slot)
    }

    /// Drop one claim. Called only when a token is dropped.
    pub(crate) fn release(&self, id: ResourceId) {
        let slot = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }

            let Some(entry) = state.by_id.get_mut(&id) else {
                log::error!("Released resource {id} which is not registered");
                debug_assert!(false, "release of unknown resource {id}");
                return;
            };

            if entry.references == 0 {
                log::error!("Resource {id} released with no outstanding references");
                debug_assert!(false, "reference count underflow for {id}");
                return;
            }

            entry.references -= 1;
            if entry.references > 0 {
                return;
            }

            let Some(entry) = state.by_id.remove(&id) else {
                return;
            };
            state.by_identity.remove(&entry.slot.identity);
            entry.slot
        };

        self.retire(&slot);
    }

    /// Record that resource `id` is being bound. Returns `true` only for the
    /// first caller.
    pub(crate) fn mark_bound(&self, id: ResourceId) -> bool {
        let mut state = self.state.borrow_mut();
        match state.by_id.get_mut(&id) {
            Some(entry) if !entry.bound => {
                entry.bound = true;
                true
            }
            _ => false,
        }
    }

    /// Undo [`RegistryShared::mark_bound`] when `bind` could not start, so
    /// the next library to obtain the resource tries again
    pub(crate) fn clear_bound(&self, id: ResourceId) {
        if let Some(entry) = self.state.borrow_mut().by_id.get_mut(&id) {
            entry.bound = false;
        }
    }

    pub(crate) fn next_library_id(&self) -> LibraryId {
        let id = self.next_library_id.get();
        self.next_library_id.set(id + 1);
        LibraryId::new(id)
    }

    fn notify(&self, kind: ResourceEventKind, slot: &ResourceSlot) {
        let event = ResourceEvent {
            kind,
            id: slot.id,
            identity: slot.identity.clone(),
            resource_kind: slot.kind,
        };
        log::debug!("{event}");
        self.events.publish(event);
    }

    /// Tear down an unregistered resource. A borrowed one finishes when its
    /// last borrow guard drops.
    fn retire(&self, slot: &ResourceSlot) {
        if !slot.retire() {
            log::warn!(
                "Resource {} is borrowed; teardown deferred until the borrow ends",
                slot.identity
            );
        }
        self.notify(ResourceEventKind::Unloaded, slot);
    }

    fn shutdown(&self) {
        let slots = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            state.by_identity.clear();

            let mut slots: Vec<_> = state.by_id.drain().map(|(_, entry)| entry).collect();
            let outstanding: u32 = slots.iter().map(|entry| entry.references).sum();
            if outstanding > 0 {
                log::debug!(
                    "Shutting down registry with {} live resource(s), {} outstanding token(s)",
                    slots.len(),
                    outstanding
                );
            }

            // Newest first: dependencies are usually loaded after dependents
            slots.sort_by(|a, b| b.slot.id.cmp(&a.slot.id));
            slots
        };

        for entry in slots {
            self.retire(&entry.slot);
        }
    }
}

fn check_kind<T: Resource>(slot: &ResourceSlot) -> Result<(), ResourceError> {
    if slot.is::<T>() {
        Ok(())
    } else {
        Err(ResourceError::TypeMismatch {
            identity: slot.identity.clone(),
            requested: kind_name::<T>(),
            registered: slot.kind,
        })
    }
}

/// Process-scoped cache mapping (assembly, path) to at most one live
/// resource, and the authority over its reference count.
///
/// Tokens and libraries refer back to the registry weakly. Dropping the
/// registry (or calling [`Registry::shutdown`]) tears down every live
/// resource once; tokens released afterwards are no-ops.
///
/// # Example
///
/// ```ignore
/// let registry = Registry::new();
/// let texture = registry.load::<Texture2D>(&assembly, "textures/missing.png")?;
/// assert_eq!(registry.reference_count(texture.id()), Some(1));
/// drop(texture); // teardown runs here
/// ```
pub struct Registry {
    shared: Rc<RegistryShared>,
}

impl Registry {
    /// Create an empty registry with no services
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RegistryShared::default()),
        }
    }

    /// Install a service and return the registry
    #[must_use]
    pub fn with_service<S: 'static>(self, service: S) -> Self {
        self.insert_service(service);
        self
    }

    /// Install a service visible to `populate`, replacing any previous one of
    /// the same type
    pub fn insert_service<S: 'static>(&self, service: S) -> Option<S> {
        self.shared.services.borrow_mut().insert(service)
    }

    /// Load the resource at `path` in `assembly`, creating it on first use.
    ///
    /// Returns a new token on every call; the reference count equals the
    /// number of live tokens.
    ///
    /// # Errors
    ///
    /// - `ResourceNotFound` / `Io` if the blob cannot be opened
    /// - `Load` if `populate` fails (nothing is registered)
    /// - `TypeMismatch` if the identity is cached as another kind
    /// - `RegistryClosed` after shutdown
    pub fn load<T: Resource + Default>(
        &self,
        assembly: &AssemblyHandle,
        path: &str,
    ) -> Result<ReferenceToken<T>, ResourceError> {
        RegistryShared::load(&self.shared, assembly, path)
    }

    /// Mint another token for a live resource
    ///
    /// # Errors
    ///
    /// Returns `StaleId` if the id is not live, `TypeMismatch` for the wrong
    /// kind
    pub fn acquire<T: Resource>(&self, id: ResourceId) -> Result<ReferenceToken<T>, ResourceError> {
        RegistryShared::acquire(&self.shared, id)
    }

    /// Look up a live resource by id
    ///
    /// # Errors
    ///
    /// Returns `StaleId` if the id is not live, `TypeMismatch` for the wrong
    /// kind
    pub fn get_by_id<T: Resource>(&self, id: ResourceId) -> Result<ResourceHandle<T>, ResourceError> {
        let slot = {
            let state = self.shared.state.borrow();
            let entry = state.by_id.get(&id).ok_or(ResourceError::StaleId(id))?;
            check_kind::<T>(&entry.slot)?;
            Rc::clone(&entry.slot)
        };

        self.shared.notify(ResourceEventKind::Got, &slot);
        Ok(ResourceHandle::from_slot(slot))
    }

    /// Look up a live resource by identity
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is registered under the identity,
    /// `TypeMismatch` for the wrong kind
    pub fn get_by_name<T: Resource>(
        &self,
        identity: &ResourceIdentity,
    ) -> Result<ResourceHandle<T>, ResourceError> {
        let slot = {
            let state = self.shared.state.borrow();
            let entry = state
                .by_identity
                .get(identity)
                .and_then(|id| state.by_id.get(id))
                .ok_or_else(|| ResourceError::NotFound(identity.clone()))?;
            check_kind::<T>(&entry.slot)?;
            Rc::clone(&entry.slot)
        };

        self.shared.notify(ResourceEventKind::Got, &slot);
        Ok(ResourceHandle::from_slot(slot))
    }

    /// Create a new library scoped to the caller
    #[must_use]
    pub fn create_library(&self) -> ResourceLibrary {
        ResourceLibrary::new(&self.shared)
    }

    /// Current reference count of a live resource
    #[must_use]
    pub fn reference_count(&self, id: ResourceId) -> Option<u32> {
        let state = self.shared.state.borrow();
        state.by_id.get(&id).map(|entry| entry.references)
    }

    /// Id of the live resource registered under `identity`
    #[must_use]
    pub fn id_of(&self, identity: &ResourceIdentity) -> Option<ResourceId> {
        let state = self.shared.state.borrow();
        state.by_identity.get(identity).copied()
    }

    /// Check if a resource is registered under `identity`
    #[must_use]
    pub fn contains(&self, identity: &ResourceIdentity) -> bool {
        self.id_of(identity).is_some()
    }

    /// Ids of all live resources, ascending
    #[must_use]
    pub fn ids(&self) -> Vec<ResourceId> {
        let state = self.shared.state.borrow();
        let mut ids: Vec<_> = state.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.borrow().by_id.len()
    }

    /// Check if no resource is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to lifecycle notifications
    pub fn subscribe(&self, observer: impl FnMut(&ResourceEvent) + 'static) -> ObserverId {
        self.shared.events.subscribe(observer)
    }

    /// Remove a subscription. Returns `false` if it was not found.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    /// Tear down every live resource and refuse further loads.
    ///
    /// Tokens still held elsewhere become inert.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// Check if the registry has shut down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.borrow().closed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Registry")
            .field("live", &state.by_id.len())
            .field("next_id", &state.next_id)
            .field("closed", &state.closed)
            .finish()
    }
}
