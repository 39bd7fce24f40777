//! Resource statistics

use std::cell::RefCell;
use std::rc::Rc;

use crate::assets::{Registry, ResourceEvent, ResourceEventKind};

/// Lifecycle counters fed by registry events
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStats {
    loaded: u64,
    got: u64,
    unloaded: u64,
    live: usize,
    peak_live: usize,
}

impl ResourceStats {
    /// Create empty stats
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a shared stats tracker to `registry`
    pub fn observe(registry: &Registry) -> Rc<RefCell<Self>> {
        let stats = Rc::new(RefCell::new(Self::new()));
        let sink = Rc::clone(&stats);
        registry.subscribe(move |event| sink.borrow_mut().record(event));
        stats
    }

    /// Count one event
    pub fn record(&mut self, event: &ResourceEvent) {
        match event.kind {
            ResourceEventKind::Loaded => {
                self.loaded += 1;
                self.live += 1;
                self.peak_live = self.peak_live.max(self.live);
            }
            ResourceEventKind::Got => self.got += 1,
            ResourceEventKind::Unloaded => {
                self.unloaded += 1;
                self.live = self.live.saturating_sub(1);
            }
        }
    }

    /// Resources created
    #[must_use]
    pub const fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Cache hits and lookups
    #[must_use]
    pub const fn got(&self) -> u64 {
        self.got
    }

    /// Resources torn down
    #[must_use]
    pub const fn unloaded(&self) -> u64 {
        self.unloaded
    }

    /// Resources currently alive
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }

    /// Highest number of resources alive at once
    #[must_use]
    pub const fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Get a formatted stats string
    #[must_use]
    pub fn format_stats(&self) -> String {
        format!(
            "Resources: {} live (peak {}) | loaded {}, got {}, unloaded {}",
            self.live, self.peak_live, self.loaded, self.got, self.unloaded
        )
    }
}
