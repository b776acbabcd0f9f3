//! Reload coordinator — turns file changes into registry reloads.
//!
//! Watches the directory containing each bound source file (not the file
//! itself: some notification backends lose track of a file that is replaced
//! by rename). Debounced events are matched by exact file name against the
//! bindings of their directory and queued for a dispatcher thread, which
//! hands each request to the lane of its name. Every name has its own lane
//! thread, so reloads of one name run in order while a slow construct or a
//! long-held lease on one name never holds back another.
//!
//! The dispatch queue is bounded. When it is full the notifier blocks until
//! the dispatcher catches up. A lane that already has a full backlog absorbs
//! further requests for its name: the queued reload has not read the file
//! yet, so it picks up the newest contents anyway. Redundant reloads of an
//! unchanged file are harmless: they produce an equivalent index and bump
//! the generation.

use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::IndexBackend;
use crate::config::SourceDescriptor;
use crate::error::{LabelError, WatcherError};
use crate::registry::ResourceRegistry;

/// Default debounce duration for file events.
const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Default capacity of the reload queue.
const DEFAULT_QUEUE: usize = 64;

/// One source file a watched directory is responsible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub name: String,
    pub file_name: OsString,
    pub path: PathBuf,
}

/// Watched directory → the sources inside it.
#[derive(Debug, Default, Clone)]
pub struct WatchBindings {
    dirs: BTreeMap<PathBuf, Vec<WatchTarget>>,
}

impl WatchBindings {
    pub fn new(sources: &[SourceDescriptor]) -> Self {
        let mut bindings = Self::default();
        for source in sources {
            let Some(file_name) = source.path.file_name() else {
                warn!(name = %source.name, path = %source.path.display(), "source path has no file name, not watched");
                continue;
            };
            let dir = normalize_dir(source.watch_dir());
            bindings.dirs.entry(dir).or_default().push(WatchTarget {
                name: source.name.clone(),
                file_name: file_name.to_os_string(),
                path: source.path.clone(),
            });
        }
        bindings
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        self.dirs.keys().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Targets whose file is `path`.
    pub fn resolve(&self, path: &Path) -> Vec<&WatchTarget> {
        let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Vec::new();
        };

        let targets = self
            .dirs
            .get(parent)
            .or_else(|| self.dirs.get(&normalize_dir(parent)));

        targets
            .map(|targets| {
                targets
                    .iter()
                    .filter(|t| t.file_name == file_name)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Canonical form when the directory exists, as given otherwise.
fn normalize_dir(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}

/// A queued request to rebuild one name from its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub name: String,
    pub path: PathBuf,
}

/// Options for [`ReloadCoordinator::start`].
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Debounce duration in milliseconds (0 = use default 200ms).
    pub debounce_ms: u64,
    /// Reload queue capacity (0 = use default 64).
    pub queue: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            queue: DEFAULT_QUEUE,
        }
    }
}

/// Keeps the watcher and reload worker alive. Drop or [`stop`] to end both.
///
/// [`stop`]: ReloadCoordinator::stop
pub struct ReloadCoordinator {
    debouncer: Option<notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>>,
    worker: Option<JoinHandle<()>>,
    watched: Vec<PathBuf>,
}

impl ReloadCoordinator {
    /// Start watching the directories of `sources` that are registered.
    ///
    /// Sources missing from the registry are not watched: a reload could
    /// never succeed for them. Any directory that cannot be watched is a
    /// fatal [`WatcherError::Init`].
    pub fn start<B: IndexBackend>(
        registry: Arc<ResourceRegistry<B>>,
        sources: &[SourceDescriptor],
        options: WatchOptions,
    ) -> Result<Self, WatcherError> {
        let debounce = if options.debounce_ms == 0 {
            Duration::from_millis(DEFAULT_DEBOUNCE_MS)
        } else {
            Duration::from_millis(options.debounce_ms)
        };
        let capacity = if options.queue == 0 {
            DEFAULT_QUEUE
        } else {
            options.queue
        };

        let served: Vec<SourceDescriptor> = sources
            .iter()
            .filter(|s| {
                let registered = registry.contains(&s.name);
                if !registered {
                    info!(name = %s.name, "endpoint not registered, not watching its source");
                }
                registered
            })
            .cloned()
            .collect();
        let bindings = WatchBindings::new(&served);
        if bindings.is_empty() {
            warn!("no registered source to watch");
        }

        let names: BTreeSet<String> = served.iter().map(|s| s.name.clone()).collect();
        let (tx, rx) = mpsc::sync_channel::<ReloadRequest>(capacity);
        let worker = spawn_worker(registry, rx, &names, capacity)?;

        let callback_bindings = bindings.clone();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            forward_events(result, &callback_bindings, &tx);
        })
        .map_err(|source| WatcherError::Init {
            dir: PathBuf::new(),
            source,
        })?;

        let mut watched = Vec::new();
        for dir in bindings.dirs() {
            debouncer
                .watcher()
                .watch(dir, notify::RecursiveMode::NonRecursive)
                .map_err(|source| WatcherError::Init {
                    dir: dir.to_path_buf(),
                    source,
                })?;
            watched.push(dir.to_path_buf());
        }

        info!(
            dirs = watched.len(),
            debounce_ms = debounce.as_millis() as u64,
            queue = capacity,
            "reload coordinator started"
        );

        Ok(Self {
            debouncer: Some(debouncer),
            worker: Some(worker),
            watched,
        })
    }

    /// Directories currently watched.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Stop watching and wait for the worker to drain queued reloads.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the debouncer drops the sender, which ends the dispatcher
        // and, once their backlogs are drained, every lane.
        drop(self.debouncer.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("reload worker panicked");
            }
            info!("reload coordinator stopped");
        }
    }
}

impl Drop for ReloadCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map debounced changes onto reload requests.
///
/// Only settled changes to files that still exist count as create/write.
/// Continuous writes wait for the burst to settle; deletions are ignored
/// and the current index keeps serving.
pub fn route_events<'a>(
    changes: impl IntoIterator<Item = (&'a Path, DebouncedEventKind)>,
    bindings: &WatchBindings,
) -> Vec<ReloadRequest> {
    let mut requests: Vec<ReloadRequest> = Vec::new();

    for (path, kind) in changes {
        let targets = bindings.resolve(path);
        if targets.is_empty() {
            continue;
        }

        match kind {
            DebouncedEventKind::Any => {
                if !path.exists() {
                    debug!(file = %path.display(), "source removed, keeping current index");
                    continue;
                }
                for target in targets {
                    let request = ReloadRequest {
                        name: target.name.clone(),
                        path: target.path.clone(),
                    };
                    if !requests.contains(&request) {
                        requests.push(request);
                    }
                }
            }
            DebouncedEventKind::AnyContinuous => {
                debug!(file = %path.display(), "skipping continuous write");
            }
            _ => {
                debug!(file = %path.display(), "unhandled event kind");
            }
        }
    }

    requests
}

/// Route one debounced batch into the reload queue.
///
/// A notification error is logged and the batch skipped; the watcher keeps
/// running. Returns `false` once the dispatcher is gone.
fn forward_events(
    result: DebounceEventResult,
    bindings: &WatchBindings,
    tx: &SyncSender<ReloadRequest>,
) -> bool {
    match result {
        Ok(events) => {
            let changes = events.iter().map(|e| (e.path.as_path(), e.kind));
            for request in route_events(changes, bindings) {
                // Blocks while the queue is full.
                if tx.send(request).is_err() {
                    debug!("reload dispatcher gone, dropping event");
                    return false;
                }
            }
            true
        }
        Err(e) => {
            let e = WatcherError::Event(e);
            warn!(error = %e, "file watcher error");
            true
        }
    }
}

/// Reload queue of one name, drained by its own thread.
struct Lane {
    tx: SyncSender<ReloadRequest>,
    worker: JoinHandle<()>,
}

fn spawn_thread(
    name: String,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, WatcherError> {
    thread::Builder::new()
        .name(name)
        .spawn(body)
        .map_err(|e| WatcherError::Init {
            dir: PathBuf::new(),
            source: notify::Error::io(e),
        })
}

/// Start one lane per name plus the dispatcher feeding them from `rx`.
///
/// The returned handle finishes once `rx` is closed and every lane has
/// drained its backlog.
fn spawn_worker<B: IndexBackend>(
    registry: Arc<ResourceRegistry<B>>,
    rx: Receiver<ReloadRequest>,
    names: &BTreeSet<String>,
    backlog: usize,
) -> Result<JoinHandle<()>, WatcherError> {
    let mut lanes: HashMap<String, Lane> = HashMap::with_capacity(names.len());
    for name in names {
        let (tx, lane_rx) = mpsc::sync_channel::<ReloadRequest>(backlog.max(1));
        let lane_registry = Arc::clone(&registry);
        let worker = spawn_thread(format!("reload-{}", name), move || {
            for request in lane_rx {
                apply_reload(&lane_registry, &request);
            }
        })?;
        lanes.insert(name.clone(), Lane { tx, worker });
    }

    spawn_thread("reload-dispatch".to_string(), move || {
        for request in rx {
            let Some(lane) = lanes.get(&request.name) else {
                // Unknown names fail fast inside the registry; no lane needed.
                apply_reload(&registry, &request);
                continue;
            };
            match lane.tx.try_send(request) {
                Ok(()) => {}
                Err(TrySendError::Full(request)) => {
                    debug!(name = %request.name, "reload backlog full, coalesced with a queued reload")
                }
                Err(TrySendError::Disconnected(request)) => {
                    warn!(name = %request.name, "reload lane gone, dropping request")
                }
            }
        }

        for (name, lane) in lanes {
            drop(lane.tx);
            if lane.worker.join().is_err() {
                warn!(name = %name, "reload lane panicked");
            }
        }
        debug!("reload queue closed");
    })
}

/// Run one reload, logging the outcome. Never fails the caller.
pub fn apply_reload<B: IndexBackend>(registry: &ResourceRegistry<B>, request: &ReloadRequest) {
    info!(name = %request.name, path = %request.path.display(), "reloading");
    match registry.reload_from_path(&request.name, &request.path) {
        Ok(swapped) => {
            info!(name = %request.name, generation = swapped.generation, "reload successful")
        }
        Err(LabelError::NotFound(name)) => {
            warn!(name = %name, "reload for unregistered endpoint ignored")
        }
        Err(e) => warn!(
            name = %request.name,
            path = %request.path.display(),
            error = %e,
            "reload failed, keeping current index"
        ),
    }
}
