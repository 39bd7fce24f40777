//! Lifecycle notifications published by the registry
//!
//! Observers are plain closures. Delivery is synchronous and happens after the
//! registry has finished its state transition, so an observer can call back
//! into the registry. Events raised while a dispatch is running are queued and
//! delivered in order once the current one finishes.
//!
//! A panicking observer is logged and skipped; it never affects registry
//! state or other observers.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use super::identity::{ResourceId, ResourceIdentity};

/// What happened to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceEventKind {
    /// A new resource was populated and registered
    Loaded,
    /// An existing resource was looked up or handed out again
    Got,
    /// A resource was removed from the registry. Its teardown has run,
    /// or runs as soon as an outstanding borrow ends.
    Unloaded,
}

impl fmt::Display for ResourceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "Loaded"),
            Self::Got => write!(f, "Got"),
            Self::Unloaded => write!(f, "Unloaded"),
        }
    }
}

/// A lifecycle notification
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    /// What happened
    pub kind: ResourceEventKind,
    /// Registry id of the resource
    pub id: ResourceId,
    /// Identity of the resource
    pub identity: ResourceIdentity,
    /// Short name of the resource kind
    pub resource_kind: &'static str,
}

impl fmt::Display for ResourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {{ name: {}, id: {} }}",
            self.kind,
            self.resource_kind,
            self.identity,
            self.id.raw()
        )
    }
}

/// Identifies a subscription so it can be removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&ResourceEvent)>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    list: Vec<(ObserverId, Observer)>,
    queue: VecDeque<ResourceEvent>,
    removed: Vec<ObserverId>,
    dispatching: bool,
}

/// Observer list with queued, panic-isolated delivery
#[derive(Default)]
pub(crate) struct EventHub {
    inner: RefCell<Observers>,
}

impl EventHub {
    pub(crate) fn subscribe(&self, observer: impl FnMut(&ResourceEvent) + 'static) -> ObserverId {
        let mut inner = self.inner.borrow_mut();
        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        inner.list.push((id, Box::new(observer)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.borrow_mut();
        if let Some(index) = inner.list.iter().position(|(existing, _)| *existing == id) {
            inner.list.remove(index);
            return true;
        }

        // The list is checked out while dispatching
        if inner.dispatching && id.0 < inner.next_id && !inner.removed.contains(&id) {
            inner.removed.push(id);
            return true;
        }

        false
    }

    pub(crate) fn len(&self) -> usize {
        let inner = self.inner.borrow();
        inner.list.len()
    }

    pub(crate) fn publish(&self, event: ResourceEvent) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.queue.push_back(event);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }

        loop {
            let (event, mut list) = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.pop_front() {
                    Some(event) => (event, std::mem::take(&mut inner.list)),
                    None => {
                        inner.dispatching = false;
                        break;
                    }
                }
            };

            for (id, observer) in &mut list {
                let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer(&event)));
                if delivered.is_err() {
                    log::error!("Resource observer {:?} panicked while handling: {}", id, event);
                }
            }

            let mut inner = self.inner.borrow_mut();
            let added = std::mem::replace(&mut inner.list, list);
            inner.list.extend(added);
            let removed = std::mem::take(&mut inner.removed);
            inner.list.retain(|(id, _)| !removed.contains(id));
        }
    }
}
