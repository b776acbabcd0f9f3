//! Error types for the label server.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LabelError>;

/// Everything that can go wrong between loading the endpoint list and
/// answering a label query.
#[derive(Debug, Error)]
pub enum LabelError {
    /// Startup configuration is unreadable or malformed. Fatal.
    #[error("config error: {0}")]
    Config(String),

    /// A backend could not build an index from its source file.
    #[error("failed to construct index from {}: {reason}", path.display())]
    Construct { path: PathBuf, reason: String },

    /// Acquire/Reload referenced a name that has no slot.
    #[error("no index registered under '{0}'")]
    NotFound(String),

    /// Register was called twice for the same name.
    #[error("index '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Query arguments were rejected before touching the registry.
    #[error("{0}")]
    Query(String),

    /// File watching failed; see [`WatcherError`] for fatal vs transient.
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Watcher failures split by severity.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// Watching could not start at all. Startup-level.
    #[error("cannot watch {}: {source}", dir.display())]
    Init {
        dir: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// One delivery failed. The watch loop keeps running.
    #[error("watch event error: {0}")]
    Event(#[source] notify::Error),
}

impl WatcherError {
    /// Whether the error means live reload is unavailable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatcherError::Init { .. })
    }
}

impl From<serde_json::Error> for LabelError {
    fn from(e: serde_json::Error) -> Self {
        LabelError::Config(format!("json: {}", e))
    }
}

impl From<toml::de::Error> for LabelError {
    fn from(e: toml::de::Error) -> Self {
        LabelError::Config(format!("toml: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watcher_error_severity() {
        let init = WatcherError::Init {
            dir: PathBuf::from("/data"),
            source: notify::Error::generic("no inotify"),
        };
        let event = WatcherError::Event(notify::Error::generic("queue overflow"));
        assert!(init.is_fatal());
        assert!(!event.is_fatal());
    }

    #[test]
    fn test_construct_message_names_path() {
        let err = LabelError::Construct {
            path: PathBuf::from("data/city.lbl"),
            reason: "line 3: bad x".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("data/city.lbl"));
        assert!(msg.contains("line 3"));
    }
}
