//! Test backend that tracks every handle it hands out.
//!
//! Released handles are poisoned: querying one fails, and the backend
//! remembers how many times each handle id went through `release`.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{IndexBackend, Record, Window};
use crate::error::{LabelError, Result};

#[derive(Debug)]
pub struct MockHandle {
    pub id: u64,
    pub path: PathBuf,
    alive: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockBackend {
    next_id: AtomicU64,
    flags: Mutex<HashMap<u64, Arc<AtomicBool>>>,
    releases: Mutex<HashMap<u64, usize>>,
    failing: Mutex<HashSet<PathBuf>>,
    invalid: Mutex<HashSet<PathBuf>>,
    construct_delay: Mutex<Option<Duration>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// `construct` on this path returns an error.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// `construct` succeeds but `validate` rejects the handle.
    pub fn invalid_on(&self, path: impl Into<PathBuf>) {
        self.invalid.lock().insert(path.into());
    }

    pub fn heal(&self, path: &Path) {
        self.failing.lock().remove(path);
        self.invalid.lock().remove(path);
    }

    pub fn set_construct_delay(&self, delay: Duration) {
        *self.construct_delay.lock() = Some(delay);
    }

    pub fn constructed(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn release_count(&self, id: u64) -> usize {
        self.releases.lock().get(&id).copied().unwrap_or(0)
    }

    pub fn total_releases(&self) -> usize {
        self.releases.lock().values().sum()
    }

    pub fn is_released(&self, id: u64) -> bool {
        self.release_count(id) > 0
    }

    /// Ids handed out that were never released.
    pub fn leaked(&self) -> Vec<u64> {
        let releases = self.releases.lock();
        (0..self.constructed())
            .filter(|id| !releases.contains_key(id))
            .collect()
    }

    pub fn max_release_count(&self) -> usize {
        self.releases.lock().values().copied().max().unwrap_or(0)
    }
}

impl IndexBackend for MockBackend {
    type Handle = MockHandle;

    fn construct(&self, path: &Path) -> Result<MockHandle> {
        let delay = *self.construct_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.failing.lock().contains(path) {
            return Err(LabelError::Construct {
                path: path.to_path_buf(),
                reason: "mock failure".to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        self.flags.lock().insert(id, Arc::clone(&alive));
        Ok(MockHandle {
            id,
            path: path.to_path_buf(),
            alive,
        })
    }

    fn validate(&self, handle: &MockHandle) -> Result<()> {
        if self.invalid.lock().contains(&handle.path) {
            return Err(LabelError::Construct {
                path: handle.path.clone(),
                reason: "mock validation failure".to_string(),
            });
        }
        Ok(())
    }

    fn query(&self, handle: &MockHandle, window: &Window) -> Result<Vec<Record>> {
        if !handle.is_alive() || self.is_released(handle.id) {
            return Err(LabelError::Query(format!(
                "handle {} queried after release",
                handle.id
            )));
        }
        let record = Record {
            x: window.x_min,
            y: window.y_min,
            t: window.t_min,
            id: handle.id as i64,
            priority: 0,
            label_factor: 1.0,
            text: handle.path.display().to_string(),
        };
        Ok(vec![record])
    }

    fn release(&self, handle: MockHandle) {
        handle.alive.store(false, Ordering::SeqCst);
        *self.releases.lock().entry(handle.id).or_insert(0) += 1;
    }
}

pub fn window() -> Window {
    Window {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.0,
        y_max: 1.0,
        t_min: 0.0,
    }
}
