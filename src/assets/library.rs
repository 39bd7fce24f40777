//! Caller-scoped resource libraries
//!
//! A library holds at most one token per (assembly, name) and releases all of
//! them together when disposed. It is also where second-phase binding runs:
//! the first library to obtain a resource calls its `bind` hook, letting the
//! resource resolve its own dependencies through that library.

use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use super::assembly::{AssemblyHandle, AssemblyId};
use super::error::ResourceError;
use super::handle::ResourceHandle;
use super::registry::RegistryShared;
use super::resource::{BindContext, Resource, ResourceSlot};
use super::token::{ReferenceToken, UntypedToken};

/// Identifies a library within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryId(u64);

impl LibraryId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Lifecycle of a library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryState {
    /// Accepting load and reference calls
    Active,
    /// Every token released; terminal
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LibraryKey {
    assembly: AssemblyId,
    name: String,
}

impl LibraryKey {
    fn new(assembly: &AssemblyHandle, name: &str) -> Self {
        Self {
            assembly: assembly.id(),
            name: name.to_string(),
        }
    }
}

/// The set of resources one scope (a scene, a game state, the engine itself)
/// currently needs.
///
/// Repeated loads of the same name are served locally and do not touch the
/// registry's reference count. Dropping the library disposes it.
pub struct ResourceLibrary {
    id: LibraryId,
    registry: Weak<RegistryShared>,
    location: String,
    tokens: FxHashMap<LibraryKey, UntypedToken>,
    state: LibraryState,
}

impl ResourceLibrary {
    pub(crate) fn new(registry: &Rc<RegistryShared>) -> Self {
        Self {
            id: registry.next_library_id(),
            registry: Rc::downgrade(registry),
            location: String::new(),
            tokens: FxHashMap::default(),
            state: LibraryState::Active,
        }
    }

    /// Prefix prepended to every name before it reaches the registry
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Get the location prefix
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Get the id of this library
    #[must_use]
    pub const fn id(&self) -> LibraryId {
        self.id
    }

    /// Get the lifecycle state
    #[must_use]
    pub const fn state(&self) -> LibraryState {
        self.state
    }

    /// Check if the library has been disposed
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state == LibraryState::Disposed
    }

    /// Load `name` from `assembly` into this scope.
    ///
    /// If the library already holds it, the cached resource is returned with
    /// no registry call. Otherwise the registry is asked for a token, the
    /// token is kept here, and the resource is bound through this library if
    /// no library has bound it yet.
    ///
    /// # Errors
    ///
    /// - `LibraryDisposed` after `dispose`
    /// - anything `Registry::load` reports
    /// - `Bind` if binding fails; the token is kept and the resource stays
    ///   reachable through [`ResourceLibrary::get`]
    pub fn load<T: Resource + Default>(
        &mut self,
        assembly: &AssemblyHandle,
        name: &str,
    ) -> Result<ResourceHandle<T>, ResourceError> {
        self.ensure_active()?;

        let key = LibraryKey::new(assembly, name);
        if let Some(token) = self.tokens.get(&key) {
            return token.handle::<T>();
        }

        let registry = self.registry()?;
        let path = format!("{}{}", self.location, name);
        let token = RegistryShared::load::<T>(&registry, assembly, &path)?;
        let handle = token.handle();
        let token = token.into_untyped();
        let slot = Rc::clone(token.slot());

        // Cached before binding so a dependency cycle finds it here
        self.tokens.insert(key, token);

        if registry.mark_bound(slot.id) {
            match self.bind(&slot) {
                Ok(()) => {}
                Err(err @ ResourceError::Busy(_)) => {
                    // Bind never started; leave it to the next load
                    registry.clear_bound(slot.id);
                    self.tokens.remove(&LibraryKey::new(assembly, name));
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(handle)
    }

    /// Load through this library and mint an extra token owned by the
    /// caller. Resources use this to hold on to their dependencies.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceLibrary::load`]
    pub fn acquire<T: Resource + Default>(
        &mut self,
        assembly: &AssemblyHandle,
        name: &str,
    ) -> Result<ReferenceToken<T>, ResourceError> {
        let handle = self.load::<T>(assembly, name)?;
        let registry = self.registry()?;
        RegistryShared::acquire(&registry, handle.id())
    }

    /// Attach a resource obtained some other way. Keyed by its path; a
    /// no-op if the library already holds that name.
    ///
    /// # Errors
    ///
    /// Returns `LibraryDisposed` after `dispose`, `StaleId` if the resource
    /// is gone
    pub fn reference<T: Resource>(&mut self, resource: &ResourceHandle<T>) -> Result<(), ResourceError> {
        self.ensure_active()?;

        let identity = resource.identity();
        let name = identity
            .path()
            .strip_prefix(self.location.as_str())
            .unwrap_or(identity.path());
        let key = LibraryKey::new(identity.assembly(), name);
        if self.tokens.contains_key(&key) {
            return Ok(());
        }

        let registry = self.registry()?;
        let token = RegistryShared::acquire::<T>(&registry, resource.id())?;
        self.tokens.insert(key, token.into_untyped());
        Ok(())
    }

    /// Get a resource this library already holds
    #[must_use]
    pub fn get<T: Resource>(&self, assembly: &AssemblyHandle, name: &str) -> Option<ResourceHandle<T>> {
        self.tokens
            .get(&LibraryKey::new(assembly, name))
            .and_then(|token| token.handle::<T>().ok())
    }

    /// Check if this library holds `name` from `assembly`
    #[must_use]
    pub fn contains(&self, assembly: &AssemblyHandle, name: &str) -> bool {
        self.tokens.contains_key(&LibraryKey::new(assembly, name))
    }

    /// Release a single held resource. Returns `false` if it was not held.
    pub fn release(&mut self, assembly: &AssemblyHandle, name: &str) -> bool {
        self.tokens.remove(&LibraryKey::new(assembly, name)).is_some()
    }

    /// Names of all held resources
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tokens.keys().map(|key| key.name.as_str())
    }

    /// Number of held tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if no token is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Release every held token and move to `Disposed`. Calling it again
    /// does nothing.
    pub fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.state = LibraryState::Disposed;

        let tokens = std::mem::take(&mut self.tokens);
        let released = tokens.len();
        drop(tokens);
        log::debug!("Disposed library {:?}, released {} token(s)", self.id, released);
    }

    fn bind(&mut self, slot: &ResourceSlot) -> Result<(), ResourceError> {
        let result = {
            let mut resource = slot
                .resource
                .try_borrow_mut()
                .map_err(|_| ResourceError::Busy(slot.identity.clone()))?;
            let Some(resource) = resource.as_mut() else {
                return Err(ResourceError::Released(slot.identity.clone()));
            };

            let mut ctx = BindContext::new(&slot.identity, self);
            resource
                .bind(&mut ctx)
                .map_err(|source| ResourceError::Bind {
                    identity: slot.identity.clone(),
                    source,
                })
        };

        // Released from inside its own bind, e.g. through a cycle
        slot.finish_retired();
        result
    }

    fn ensure_active(&self) -> Result<(), ResourceError> {
        match self.state {
            LibraryState::Active => Ok(()),
            LibraryState::Disposed => Err(ResourceError::LibraryDisposed),
        }
    }

    fn registry(&self) -> Result<Rc<RegistryShared>, ResourceError> {
        self.registry.upgrade().ok_or(ResourceError::RegistryClosed)
    }
}

impl Drop for ResourceLibrary {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::{OtherProbe, Probe, fixture};

    #[test]
    fn test_repeated_load_holds_one_token() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();

        let first = library.load::<Probe>(&assembly, "tex/a.png").unwrap();
        for _ in 0..4 {
            let again = library.load::<Probe>(&assembly, "tex/a.png").unwrap();
            assert_eq!(again, first);
        }

        assert_eq!(library.len(), 1);
        assert_eq!(registry.reference_count(first.id()), Some(1));
        assert_eq!(journal.count("populate:tex/a.png"), 1);
        assert_eq!(journal.count("bind:tex/a.png"), 1);
    }

    #[test]
    fn test_two_libraries_share_instance() {
        let (registry, assembly, journal) = fixture();
        let mut scene = registry.create_library();
        let mut hud = registry.create_library();

        let a = scene.load::<Probe>(&assembly, "tex/a.png").unwrap();
        let b = hud.load::<Probe>(&assembly, "tex/a.png").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.id().raw(), 0);
        assert_eq!(registry.reference_count(a.id()), Some(2));
        assert_eq!(journal.count("bind:tex/a.png"), 1);

        scene.dispose();
        assert_eq!(registry.reference_count(a.id()), Some(1));
        hud.dispose();
        assert_eq!(registry.reference_count(a.id()), None);
        assert_eq!(journal.count("teardown:tex/a.png"), 1);

        let mut later = registry.create_library();
        let c = later.load::<Probe>(&assembly, "tex/a.png").unwrap();
        assert_eq!(c.id().raw(), 1);
    }

    #[test]
    fn test_dispose_releases_each_token_once() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();
        let a = library.load::<Probe>(&assembly, "tex/a.png").unwrap();
        let b = library.load::<Probe>(&assembly, "tex/b.png").unwrap();
        let keep = registry.acquire::<Probe>(a.id()).unwrap();

        library.dispose();
        assert!(library.is_empty());
        assert!(library.is_disposed());
        assert_eq!(registry.reference_count(a.id()), Some(1));
        assert_eq!(registry.reference_count(b.id()), None);
        assert_eq!(journal.count("teardown:tex/b.png"), 1);

        library.dispose();
        assert_eq!(registry.reference_count(a.id()), Some(1));
        drop(keep);
        assert_eq!(journal.count("teardown:tex/a.png"), 1);
    }

    #[test]
    fn test_load_after_dispose_fails() {
        let (registry, assembly, _journal) = fixture();
        let mut library = registry.create_library();
        library.dispose();

        assert!(matches!(
            library.load::<Probe>(&assembly, "tex/a.png"),
            Err(ResourceError::LibraryDisposed)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dependency_is_bound_and_counted() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();

        let material = library.load::<Probe>(&assembly, "mat/m").unwrap();
        let texture = library.get::<Probe>(&assembly, "tex/a.png").unwrap();

        // One claim held by the library, one by the material itself
        assert_eq!(registry.reference_count(texture.id()), Some(2));
        assert_eq!(material.get().unwrap().dependencies(), 1);

        library.dispose();
        assert!(registry.is_empty());
        assert_eq!(journal.count("teardown:mat/m"), 1);
        assert_eq!(journal.count("teardown:tex/a.png"), 1);
    }

    #[test]
    fn test_bind_runs_once_per_resource() {
        let (registry, assembly, journal) = fixture();
        let mut first = registry.create_library();
        let mut second = registry.create_library();

        first.load::<Probe>(&assembly, "mat/m").unwrap();
        first.load::<Probe>(&assembly, "mat/m").unwrap();
        second.load::<Probe>(&assembly, "mat/m").unwrap();
        second.load::<Probe>(&assembly, "mat/m").unwrap();

        assert_eq!(journal.count("bind:mat/m"), 1);
        assert!(!second.contains(&assembly, "tex/a.png"));
        let texture = first.get::<Probe>(&assembly, "tex/a.png").unwrap();
        // first library and the material's own claim
        assert_eq!(registry.reference_count(texture.id()), Some(2));

        // Still bound after the binding library goes away
        first.dispose();
        second.load::<Probe>(&assembly, "mat/m").unwrap();
        assert_eq!(journal.count("bind:mat/m"), 1);
        assert!(texture.is_alive());
    }

    #[test]
    fn test_dependency_cycle_binds_without_recursion() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();

        let x = library.load::<Probe>(&assembly, "cyc/x").unwrap();
        let y = library.get::<Probe>(&assembly, "cyc/y").unwrap();
        assert_eq!(journal.count("bind:cyc/x"), 1);
        assert_eq!(journal.count("bind:cyc/y"), 1);
        assert_eq!(registry.reference_count(x.id()), Some(2));
        assert_eq!(registry.reference_count(y.id()), Some(2));

        // Each keeps the other alive until the registry goes away
        library.dispose();
        assert_eq!(registry.len(), 2);
        registry.shutdown();
        assert_eq!(journal.count("teardown:cyc/"), 2);
    }

    #[test]
    fn test_failed_bind_keeps_resource() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();

        let err = library.load::<Probe>(&assembly, "mat/broken").unwrap_err();
        assert!(matches!(err, ResourceError::Bind { .. }));

        let kept = library.get::<Probe>(&assembly, "mat/broken").unwrap();
        assert!(kept.is_alive());
        assert_eq!(registry.reference_count(kept.id()), Some(1));

        let again = library.load::<Probe>(&assembly, "mat/broken").unwrap();
        assert_eq!(again, kept);
        assert_eq!(journal.count("bind:mat/broken"), 1);
    }

    #[test]
    fn test_reference_is_idempotent() {
        let (registry, assembly, journal) = fixture();
        let token = registry.load::<Probe>(&assembly, "tex/a.png").unwrap();
        let mut library = registry.create_library();

        library.reference(&token.handle()).unwrap();
        library.reference(&token.handle()).unwrap();
        assert_eq!(registry.reference_count(token.id()), Some(2));
        assert!(library.contains(&assembly, "tex/a.png"));
        assert_eq!(journal.count("bind:"), 0);

        // A later load of the same name is served locally
        library.load::<Probe>(&assembly, "tex/a.png").unwrap();
        assert_eq!(registry.reference_count(token.id()), Some(2));
    }

    #[test]
    fn test_location_prefix() {
        let (registry, assembly, _journal) = fixture();
        let mut library = registry.create_library().with_location("tex/");

        let handle = library.load::<Probe>(&assembly, "a.png").unwrap();
        assert_eq!(handle.identity().path(), "tex/a.png");
        assert!(library.contains(&assembly, "a.png"));
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["a.png"]);

        let token = registry.load::<Probe>(&assembly, "tex/a.png").unwrap();
        library.reference(&token.handle()).unwrap();
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_local_type_mismatch() {
        let (registry, assembly, _journal) = fixture();
        let mut library = registry.create_library();
        let texture = library.load::<Probe>(&assembly, "tex/a.png").unwrap();

        assert!(matches!(
            library.load::<OtherProbe>(&assembly, "tex/a.png"),
            Err(ResourceError::TypeMismatch { .. })
        ));
        assert!(library.get::<OtherProbe>(&assembly, "tex/a.png").is_none());
        assert_eq!(registry.reference_count(texture.id()), Some(1));
    }

    #[test]
    fn test_bind_retried_after_busy_resource() {
        let (registry, assembly, journal) = fixture();
        let direct = registry.load::<Probe>(&assembly, "mat/m").unwrap();
        let mut library = registry.create_library();

        {
            let _borrowed = direct.get().unwrap();
            assert!(matches!(
                library.load::<Probe>(&assembly, "mat/m"),
                Err(ResourceError::Busy(_))
            ));
        }
        assert!(!library.contains(&assembly, "mat/m"));
        assert_eq!(registry.reference_count(direct.id()), Some(1));
        assert_eq!(journal.count("bind:mat/m"), 0);

        let material = library.load::<Probe>(&assembly, "mat/m").unwrap();
        assert_eq!(journal.count("bind:mat/m"), 1);
        assert_eq!(material.get().unwrap().dependencies(), 1);
        assert_eq!(registry.reference_count(direct.id()), Some(2));

        let mut other = registry.create_library();
        other.load::<Probe>(&assembly, "mat/m").unwrap();
        assert_eq!(journal.count("bind:mat/m"), 1);
    }

    #[test]
    fn test_release_single_name() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();
        library.load::<Probe>(&assembly, "tex/a.png").unwrap();

        assert!(library.release(&assembly, "tex/a.png"));
        assert!(!library.release(&assembly, "tex/a.png"));
        assert_eq!(journal.count("teardown:tex/a.png"), 1);
    }

    #[test]
    fn test_library_outliving_registry() {
        let (registry, assembly, journal) = fixture();
        let mut library = registry.create_library();
        library.load::<Probe>(&assembly, "tex/a.png").unwrap();

        drop(registry);
        assert_eq!(journal.count("teardown:tex/a.png"), 1);
        assert!(matches!(
            library.load::<Probe>(&assembly, "tex/b.png"),
            Err(ResourceError::RegistryClosed)
        ));
        drop(library);
        assert_eq!(journal.count("teardown:tex/a.png"), 1);
    }
}
