//! Reference tokens: one token is one strong claim on a resource
//!
//! Tokens are minted only by the registry. They are move-only; dropping or
//! releasing one decrements the resource's reference count by exactly one,
//! so a token cannot be released twice.

use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::error::ResourceError;
use super::handle::{ResourceHandle, ResourceRef, ResourceRefMut, borrow_slot, borrow_slot_mut};
use super::identity::{ResourceId, ResourceIdentity};
use super::registry::RegistryShared;
use super::resource::{Resource, ResourceSlot, kind_name};

/// The part of a token that owns the count. Releasing happens in `Drop`.
struct TokenCore {
    slot: Rc<ResourceSlot>,
    registry: Weak<RegistryShared>,
}

impl Drop for TokenCore {
    fn drop(&mut self) {
        // A dead registry has already torn everything down
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.slot.id);
        }
    }
}

/// Ownership proof for one strong claim on a resource of kind `T`.
///
/// The resource stays alive while at least one token exists. Duplicating
/// access goes back through the registry or a library so the count stays
/// exact.
#[must_use = "dropping a token releases its claim immediately"]
pub struct ReferenceToken<T> {
    core: TokenCore,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> ReferenceToken<T> {
    /// The registry has already counted this claim
    pub(crate) fn new(slot: Rc<ResourceSlot>, registry: Weak<RegistryShared>) -> Self {
        debug_assert!(slot.is::<T>());
        Self {
            core: TokenCore { slot, registry },
            _marker: PhantomData,
        }
    }

    /// Get the registry id of the resource
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.core.slot.id
    }

    /// Get the identity of the resource
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.core.slot.identity
    }

    /// Create a non-counting handle to the same resource
    #[must_use]
    pub fn handle(&self) -> ResourceHandle<T> {
        ResourceHandle::from_slot(Rc::clone(&self.core.slot))
    }

    /// Borrow the resource
    ///
    /// # Errors
    ///
    /// Returns `Busy` while the resource is mutably borrowed
    pub fn get(&self) -> Result<ResourceRef<'_, T>, ResourceError> {
        borrow_slot(&self.core.slot)
    }

    /// Borrow the resource mutably
    ///
    /// # Errors
    ///
    /// Returns `Busy` while the resource is borrowed elsewhere
    pub fn get_mut(&self) -> Result<ResourceRefMut<'_, T>, ResourceError> {
        borrow_slot_mut(&self.core.slot)
    }

    /// Give up this claim now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }

    /// Erase the kind, keeping the claim
    pub fn into_untyped(self) -> UntypedToken {
        UntypedToken { core: self.core }
    }
}

impl<T> fmt::Debug for ReferenceToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceToken")
            .field("id", &self.core.slot.id)
            .field("identity", &self.core.slot.identity.to_string())
            .finish()
    }
}

/// A token whose kind is only known at runtime. Libraries store these.
pub struct UntypedToken {
    core: TokenCore,
}

impl UntypedToken {
    /// Get the registry id of the resource
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.core.slot.id
    }

    /// Get the identity of the resource
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.core.slot.identity
    }

    /// Short name of the resource kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.core.slot.kind
    }

    /// Check if the resource is of kind `T`
    #[must_use]
    pub fn is<T: Resource>(&self) -> bool {
        self.core.slot.is::<T>()
    }

    /// Create a typed non-counting handle
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the resource is not a `T`
    pub fn handle<T: Resource>(&self) -> Result<ResourceHandle<T>, ResourceError> {
        if self.is::<T>() {
            Ok(ResourceHandle::from_slot(Rc::clone(&self.core.slot)))
        } else {
            Err(self.mismatch::<T>())
        }
    }

    /// Recover the typed token
    ///
    /// # Errors
    ///
    /// Gives the token back unchanged if the resource is not a `T`
    pub fn typed<T: Resource>(self) -> Result<ReferenceToken<T>, Self> {
        if self.is::<T>() {
            Ok(ReferenceToken {
                core: self.core,
                _marker: PhantomData,
            })
        } else {
            Err(self)
        }
    }

    pub(crate) fn slot(&self) -> &Rc<ResourceSlot> {
        &self.core.slot
    }

    pub(crate) fn mismatch<T: Resource>(&self) -> ResourceError {
        ResourceError::TypeMismatch {
            identity: self.core.slot.identity.clone(),
            requested: kind_name::<T>(),
            registered: self.core.slot.kind,
        }
    }
}

impl fmt::Debug for UntypedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntypedToken")
            .field("id", &self.core.slot.id)
            .field("identity", &self.core.slot.identity.to_string())
            .field("kind", &self.core.slot.kind)
            .finish()
    }
}
