//! Resource registry — named, hot-swappable index handles.
//!
//! The registry maps each configured name to a [`ResourceSlot`]. The map is
//! filled at startup (registration takes `&mut self`) and frozen once the
//! registry is shared, so looking a name up never takes a lock. All
//! coordination happens inside the individual slots, which keeps a reload of
//! one name from touching readers of any other.
//!
//! ## Reload protocol
//!
//! ```text
//!   construct candidate          (no lock held, may be slow)
//!        │
//!   validate ── fail ──▶ release candidate, keep current, report
//!        │
//!   exclusive swap               (waits for outstanding leases, O(1))
//!        │
//!   release superseded handle    (after the swap is visible)
//! ```

pub mod builder;
pub mod slot;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{IndexBackend, OwnedHandle};
use crate::error::{LabelError, Result};

pub use builder::build_registry;
pub use slot::{Lease, ResourceSlot};

/// Outcome of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swapped {
    pub generation: u64,
}

/// Owns one slot per registered name.
pub struct ResourceRegistry<B: IndexBackend> {
    backend: Arc<B>,
    slots: HashMap<String, ResourceSlot<B>>,
}

impl<B: IndexBackend> ResourceRegistry<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            slots: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Register `name` with its initial handle. Startup only.
    ///
    /// On a duplicate name the handle is released and the existing slot is
    /// left untouched.
    pub fn register(&mut self, name: impl Into<String>, handle: B::Handle) -> Result<()> {
        let name = name.into();
        let handle = OwnedHandle::new(Arc::clone(&self.backend), handle);

        if self.slots.contains_key(&name) {
            drop(handle);
            return Err(LabelError::AlreadyRegistered(name));
        }

        debug!(name = %name, "slot registered");
        self.slots
            .insert(name.clone(), ResourceSlot::new(name, handle));
        Ok(())
    }

    /// Borrow the current handle of `name` for one query.
    ///
    /// Never blocks for unknown names. For known names it only waits on a
    /// swap of that same name.
    pub fn acquire(&self, name: &str) -> Result<Lease<'_, B>> {
        self.slot(name).map(ResourceSlot::acquire)
    }

    /// Replace the handle of `name` with whatever `construct` builds.
    ///
    /// `construct` runs without holding any lock. If it fails, or the
    /// backend rejects the candidate, the current handle and generation
    /// stay as they are and the candidate (if any) is released.
    pub fn reload<F>(&self, name: &str, construct: F) -> Result<Swapped>
    where
        F: FnOnce(&B) -> Result<B::Handle>,
    {
        let slot = self.slot(name)?;

        let candidate = construct(&self.backend)?;
        let candidate = OwnedHandle::new(Arc::clone(&self.backend), candidate);
        if let Err(e) = self.backend.validate(&candidate) {
            drop(candidate);
            return Err(e);
        }

        let generation = slot.swap(candidate);
        info!(name = %name, generation, "index reloaded");
        Ok(Swapped { generation })
    }

    /// Reload `name` by constructing from `path` with the registry's backend.
    pub fn reload_from_path(&self, name: &str, path: &Path) -> Result<Swapped> {
        self.reload(name, |backend| backend.construct(path))
    }

    /// Names that currently have a slot.
    pub fn names(&self) -> BTreeSet<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn generation(&self, name: &str) -> Result<u64> {
        self.slot(name).map(ResourceSlot::generation)
    }

    pub fn slot(&self, name: &str) -> Result<&ResourceSlot<B>> {
        self.slots
            .get(name)
            .ok_or_else(|| LabelError::NotFound(name.to_string()))
    }

    /// Release every current handle.
    ///
    /// Only possible once nothing else holds the registry; otherwise the
    /// handles are left to whichever owner drops last.
    pub fn shutdown(registry: Arc<Self>) {
        match Arc::try_unwrap(registry) {
            Ok(registry) => {
                let count = registry.slots.len();
                for (name, slot) in registry.slots {
                    debug!(name = %name, generation = slot.generation(), "releasing index");
                    drop(slot);
                }
                info!(released = count, "indexes released");
            }
            Err(shared) => {
                warn!(
                    references = Arc::strong_count(&shared),
                    "registry still shared at shutdown, skipping explicit release"
                );
            }
        }
    }
}

impl<B: IndexBackend> fmt::Debug for ResourceRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}
