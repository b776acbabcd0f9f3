//! Startup configuration.
//!
//! Two inputs:
//! - the endpoint list, a JSON array of `{"name": ..., "path": ...}` pairs
//!   binding each served name to its label file;
//! - optional server settings in TOML. Every field has a default, and
//!   command-line flags override whatever the file sets.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{LabelError, Result};

/// Immutable binding between a served name and its source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Directory to watch for changes to this source.
    pub fn watch_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    name: String,
    path: String,
}

/// Read and validate the endpoint list from `path`.
///
/// Relative source paths resolve against the working directory.
pub fn load_sources(path: &Path) -> Result<Vec<SourceDescriptor>> {
    let data = fs::read_to_string(path)
        .map_err(|e| LabelError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let cwd = std::env::current_dir()?;
    let sources = parse_sources(&data, &cwd)?;
    info!(file = %path.display(), endpoints = sources.len(), "endpoint config loaded");
    Ok(sources)
}

/// Parse an endpoint list, resolving relative paths against `base`.
///
/// Duplicate names keep the first entry; later ones are logged and dropped.
pub fn parse_sources(json: &str, base: &Path) -> Result<Vec<SourceDescriptor>> {
    let raw: Vec<RawEndpoint> = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(raw.len());

    for (i, entry) in raw.into_iter().enumerate() {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(LabelError::Config(format!("endpoint #{} has an empty name", i)));
        }
        if entry.path.trim().is_empty() {
            return Err(LabelError::Config(format!("endpoint '{}' has an empty path", name)));
        }
        if !seen.insert(name.to_string()) {
            warn!(name = %name, path = %entry.path, "duplicate endpoint name, entry dropped");
            continue;
        }

        let path = Path::new(&entry.path);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        };
        sources.push(SourceDescriptor::new(name, path));
    }

    if sources.is_empty() {
        return Err(LabelError::Config("no endpoints configured".to_string()));
    }

    Ok(sources)
}

/// Server settings, from TOML and the command line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// TCP port for the HTTP surface.
    pub port: u16,
    /// Path prefix under which label collections are served.
    pub root: String,
    /// renderd.conf, used to list tile endpoints.
    pub renderd: PathBuf,
    /// The JSON endpoint list.
    pub endpoints: PathBuf,
    /// Quiet period before a file change triggers a reload (0 = default).
    pub debounce_ms: u64,
    /// Watch source files and reload on change.
    pub watch: bool,
    /// Capacity of the reload request queue.
    pub reload_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            root: "label".to_string(),
            renderd: PathBuf::from("/usr/local/etc/renderd.conf"),
            endpoints: PathBuf::from("default.json"),
            debounce_ms: 200,
            watch: true,
            reload_queue: 64,
        }
    }
}

impl ServerSettings {
    /// Load settings from a TOML file.
    ///
    /// Values are not checked here: command-line overrides may still fix
    /// them. Call [`validate`](Self::validate) on the merged result.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| LabelError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(toml::from_str(&data)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(LabelError::Config(
                "port not in allowed range, use a free port out of [1, 65535]".to_string(),
            ));
        }
        if self.root.trim_matches('/').is_empty() {
            return Err(LabelError::Config("root prefix must not be empty".to_string()));
        }
        if self.root.trim_matches('/').contains('/') {
            return Err(LabelError::Config(format!(
                "root prefix '{}' must be a single path segment",
                self.root
            )));
        }
        if self.reload_queue == 0 {
            return Err(LabelError::Config("reload_queue must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Root prefix without surrounding slashes.
    pub fn root_segment(&self) -> &str {
        self.root.trim_matches('/')
    }
}
