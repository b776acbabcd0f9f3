//! Index backend — the opaque construct/query/release contract.
//!
//! A backend turns a source file into a queryable handle. Handles have an
//! explicit lifetime: every successfully constructed handle must be handed
//! back to [`IndexBackend::release`] exactly once. [`OwnedHandle`] enforces
//! that pairing by tying the release call to `Drop`.

pub mod label_file;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

pub use label_file::LabelFileBackend;

/// One label as returned by a spatial query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub x: f64,
    pub y: f64,
    pub t: f64,
    pub id: i64,
    pub priority: i32,
    pub label_factor: f64,
    pub text: String,
}

/// Query window: an axis-aligned box plus a lower bound on `t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub t_min: f64,
}

impl Window {
    pub fn contains(&self, record: &Record) -> bool {
        record.x >= self.x_min
            && record.x <= self.x_max
            && record.y >= self.y_min
            && record.y <= self.y_max
            && record.t >= self.t_min
    }
}

/// Builds, queries and releases index instances.
///
/// Implementations must be shareable across threads: the registry calls
/// `query` from many readers at once and `construct` from the reload worker.
pub trait IndexBackend: Send + Sync + 'static {
    /// The opaque index instance.
    type Handle: Send + Sync + 'static;

    /// Build an index from the file at `path`. May be slow.
    fn construct(&self, path: &Path) -> Result<Self::Handle>;

    /// Check a freshly constructed handle before it is put into service.
    ///
    /// A handle that fails here is still released by the caller.
    fn validate(&self, _handle: &Self::Handle) -> Result<()> {
        Ok(())
    }

    /// Run a window query against a live handle.
    fn query(&self, handle: &Self::Handle, window: &Window) -> Result<Vec<Record>>;

    /// Free the handle. Called exactly once per constructed handle.
    fn release(&self, handle: Self::Handle);
}

/// Single-owner wrapper that releases its handle through the backend when
/// dropped. Move-only, so the release cannot run twice.
pub struct OwnedHandle<B: IndexBackend> {
    handle: Option<B::Handle>,
    backend: Arc<B>,
}

impl<B: IndexBackend> OwnedHandle<B> {
    pub fn new(backend: Arc<B>, handle: B::Handle) -> Self {
        Self {
            handle: Some(handle),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: IndexBackend> Deref for OwnedHandle<B> {
    type Target = B::Handle;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the handle out.
        match self.handle.as_ref() {
            Some(h) => h,
            None => unreachable!("handle accessed after release"),
        }
    }
}

impl<B: IndexBackend> Drop for OwnedHandle<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.backend.release(handle);
        }
    }
}

impl<B: IndexBackend> fmt::Debug for OwnedHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("live", &self.handle.is_some())
            .finish()
    }
}
