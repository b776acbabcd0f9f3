//! # label-server
//!
//! Serves map labels from named, file-backed spatial indexes and reloads an
//! index in place when its source file changes on disk.
//!
//! ## Key Features
//!
//! - **Per-name slots**: every endpoint has its own lock; reloading one
//!   never stalls another
//! - **Safe hot reload**: a superseded index is released only after every
//!   reader borrowing it has finished
//! - **Fair locking**: sustained query load cannot starve a pending reload
//! - **GeoJSON over HTTP**: window queries answered as feature collections
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use label_server::{build_registry, IndexBackend, LabelFileBackend, SourceDescriptor, Window};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(LabelFileBackend::new());
//! let sources = vec![SourceDescriptor::new("city", "data/city.lbl")];
//! let registry = build_registry(Arc::clone(&backend), &sources);
//!
//! let window = Window { x_min: 13.0, x_max: 14.0, y_min: 52.0, y_max: 53.0, t_min: 0.0 };
//! let lease = registry.acquire("city").unwrap();
//! let labels = backend.query(&lease, &window).unwrap();
//! lease.release();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod tiles;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use backend::{IndexBackend, LabelFileBackend, OwnedHandle, Record, Window};
pub use config::{load_sources, parse_sources, ServerSettings, SourceDescriptor};
pub use error::{LabelError, Result, WatcherError};
pub use registry::{build_registry, Lease, ResourceRegistry, ResourceSlot, Swapped};
pub use server::{HttpServer, HttpStopper, ServerState};
pub use tiles::{load_tile_endpoints, TileEndpoint};
pub use watcher::{ReloadCoordinator, ReloadRequest, WatchBindings, WatchOptions};
