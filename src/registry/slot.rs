//! Per-name slot: one current handle, its generation, and the lock that
//! keeps readers and the swap apart.
//!
//! The lock is a `parking_lot::RwLock`, which is task-fair: once a swap is
//! waiting for exclusive access, new readers queue behind it instead of
//! slipping past. Sustained query load therefore cannot hold a reload off
//! forever, and readers queued behind the swap are admitted right after it.
//!
//! Readers must not acquire the same name twice on one thread while
//! holding a lease; a queued swap would deadlock that thread.

use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::backend::{IndexBackend, OwnedHandle};

struct Current<B: IndexBackend> {
    handle: OwnedHandle<B>,
    generation: u64,
}

/// Container for one named index.
pub struct ResourceSlot<B: IndexBackend> {
    name: String,
    current: RwLock<Current<B>>,
    pending_swaps: AtomicUsize,
}

impl<B: IndexBackend> ResourceSlot<B> {
    /// Create a slot around its initial handle at generation 0.
    pub fn new(name: impl Into<String>, handle: OwnedHandle<B>) -> Self {
        Self {
            name: name.into(),
            current: RwLock::new(Current {
                handle,
                generation: 0,
            }),
            pending_swaps: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the current handle under shared access.
    pub fn acquire(&self) -> Lease<'_, B> {
        Lease {
            name: &self.name,
            guard: self.current.read(),
        }
    }

    /// Generation of the current handle.
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Swaps waiting for (or holding) exclusive access.
    pub fn pending_swaps(&self) -> usize {
        self.pending_swaps.load(Ordering::SeqCst)
    }

    /// Replace the current handle and return the new generation.
    ///
    /// Blocks until every outstanding lease is gone. The superseded handle
    /// is released after the exclusive section ends; by then no lease can
    /// reference it.
    pub fn swap(&self, replacement: OwnedHandle<B>) -> u64 {
        self.pending_swaps.fetch_add(1, Ordering::SeqCst);
        let (old, generation) = {
            let mut current = self.current.write();
            self.pending_swaps.fetch_sub(1, Ordering::SeqCst);
            let old = mem::replace(&mut current.handle, replacement);
            current.generation += 1;
            (old, current.generation)
        };

        drop(old);
        debug!(name = %self.name, generation, "slot swapped");
        generation
    }
}

impl<B: IndexBackend> fmt::Debug for ResourceSlot<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSlot")
            .field("name", &self.name)
            .field("pending_swaps", &self.pending_swaps())
            .finish()
    }
}

/// Shared borrow of a slot's current handle.
///
/// Dropping the lease (or calling [`Lease::release`]) ends the borrow on
/// every exit path, including unwinding out of a failed query.
#[must_use = "the handle is only protected while the lease is held"]
pub struct Lease<'a, B: IndexBackend> {
    name: &'a str,
    guard: RwLockReadGuard<'a, Current<B>>,
}

impl<'a, B: IndexBackend> Lease<'a, B> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn generation(&self) -> u64 {
        self.guard.generation
    }

    pub fn handle(&self) -> &B::Handle {
        &self.guard.handle
    }

    /// End the borrow explicitly.
    pub fn release(self) {}
}

impl<'a, B: IndexBackend> Deref for Lease<'a, B> {
    type Target = B::Handle;

    fn deref(&self) -> &Self::Target {
        self.handle()
    }
}

impl<'a, B: IndexBackend> fmt::Debug for Lease<'a, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("name", &self.name)
            .field("generation", &self.generation())
            .finish()
    }
}
