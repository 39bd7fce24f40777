//! Non-owning resource handles
//!
//! A handle gives typed access to a resource without holding a claim on it.
//! Only [`ReferenceToken`](super::ReferenceToken)s keep a resource alive.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use super::error::ResourceError;
use super::identity::{ResourceId, ResourceIdentity};
use super::resource::{Resource, ResourceSlot, downcast_mut, downcast_ref};

/// A typed, non-counting view onto a resource of kind `T`.
///
/// Use `get()` to borrow the resource. Once the resource has been torn down
/// the handle reports [`ResourceError::Released`].
pub struct ResourceHandle<T> {
    slot: Rc<ResourceSlot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> ResourceHandle<T> {
    /// Callers must have checked that the slot holds a `T`
    pub(crate) fn from_slot(slot: Rc<ResourceSlot>) -> Self {
        debug_assert!(slot.is::<T>());
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Get the registry id of the resource
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.slot.id
    }

    /// Get the identity of the resource
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.slot.identity
    }

    /// Check if the resource has not been torn down yet
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.slot.is_alive()
    }

    /// Borrow the resource
    ///
    /// # Errors
    ///
    /// Returns `Released` after teardown, `Busy` while it is mutably borrowed
    pub fn get(&self) -> Result<ResourceRef<'_, T>, ResourceError> {
        borrow_slot(&self.slot)
    }

    /// Borrow the resource mutably
    ///
    /// # Errors
    ///
    /// Returns `Released` after teardown, `Busy` while it is borrowed
    pub fn get_mut(&self) -> Result<ResourceRefMut<'_, T>, ResourceError> {
        borrow_slot_mut(&self.slot)
    }
}

/// Finishes a deferred teardown once the borrow it belongs to has ended
struct FinishRetired<'a>(&'a ResourceSlot);

impl Drop for FinishRetired<'_> {
    fn drop(&mut self) {
        self.0.finish_retired();
    }
}

/// Shared borrow of a resource.
///
/// If the resource is released while borrowed, its teardown runs when the
/// last borrow is dropped.
pub struct ResourceRef<'a, T> {
    // Dropped before `_finish` so the slot is free again when it runs
    inner: Ref<'a, T>,
    _finish: FinishRetired<'a>,
}

impl<T> Deref for ResourceRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

/// Exclusive borrow of a resource; see [`ResourceRef`]
pub struct ResourceRefMut<'a, T> {
    inner: RefMut<'a, T>,
    _finish: FinishRetired<'a>,
}

impl<T> Deref for ResourceRefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for ResourceRefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceRefMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

pub(crate) fn borrow_slot<T: Resource>(
    slot: &ResourceSlot,
) -> Result<ResourceRef<'_, T>, ResourceError> {
    let guard = slot
        .resource
        .try_borrow()
        .map_err(|_| ResourceError::Busy(slot.identity.clone()))?;

    let inner = Ref::filter_map(guard, |resource| {
        resource
            .as_deref()
            .and_then(|resource| downcast_ref::<T>(resource))
    })
    .map_err(|_| ResourceError::Released(slot.identity.clone()))?;

    Ok(ResourceRef {
        inner,
        _finish: FinishRetired(slot),
    })
}

pub(crate) fn borrow_slot_mut<T: Resource>(
    slot: &ResourceSlot,
) -> Result<ResourceRefMut<'_, T>, ResourceError> {
    let guard = slot
        .resource
        .try_borrow_mut()
        .map_err(|_| ResourceError::Busy(slot.identity.clone()))?;

    let inner = RefMut::filter_map(guard, |resource| {
        resource
            .as_deref_mut()
            .and_then(|resource| downcast_mut::<T>(resource))
    })
    .map_err(|_| ResourceError::Released(slot.identity.clone()))?;

    Ok(ResourceRefMut {
        inner,
        _finish: FinishRetired(slot),
    })
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for ResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> Eq for ResourceHandle<T> {}

impl<T> Hash for ResourceHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.id.hash(state);
    }
}

impl<T> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.slot.id)
            .field("identity", &self.slot.identity.to_string())
            .field("kind", &self.slot.kind)
            .finish()
    }
}
