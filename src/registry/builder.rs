//! Registry builder — constructs the initial handles and fills the slots.
//!
//! Construction runs in parallel; registration keeps configuration order so
//! the logs read the same way the endpoint file does.

use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

use super::ResourceRegistry;
use crate::backend::IndexBackend;
use crate::config::SourceDescriptor;

/// Build a registry from the configured sources.
///
/// A source whose index cannot be constructed is logged and left out; it
/// will answer `NotFound` for the life of the process.
pub fn build_registry<B: IndexBackend>(
    backend: Arc<B>,
    sources: &[SourceDescriptor],
) -> ResourceRegistry<B> {
    let built: Vec<_> = sources
        .par_iter()
        .map(|source| {
            let handle = backend
                .construct(&source.path)
                .and_then(|handle| match backend.validate(&handle) {
                    Ok(()) => Ok(handle),
                    Err(e) => {
                        backend.release(handle);
                        Err(e)
                    }
                });
            (source, handle)
        })
        .collect();

    let mut registry = ResourceRegistry::new(backend);
    for (source, handle) in built {
        match handle {
            Ok(handle) => match registry.register(source.name.clone(), handle) {
                Ok(()) => {
                    info!(name = %source.name, path = %source.path.display(), "endpoint available")
                }
                Err(e) => warn!(name = %source.name, error = %e, "endpoint skipped"),
            },
            Err(e) => {
                warn!(
                    name = %source.name,
                    path = %source.path.display(),
                    error = %e,
                    "init failed, data not available"
                );
            }
        }
    }

    registry
}
