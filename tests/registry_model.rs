//! Model-based checks of the registry against a counting backend.
//!
//! Random sequences of acquire/reload/failed-reload operations must keep:
//! - generation == number of successful swaps for that name;
//! - every handle released at most once, and only after it stopped being
//!   current;
//! - no handle leaked once the registry is gone.

use label_server::{IndexBackend, LabelError, Record, ResourceRegistry, Result, Window};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
struct Counted {
    id: u64,
}

#[derive(Default)]
struct CountingBackend {
    next: Mutex<u64>,
    releases: Mutex<HashMap<u64, usize>>,
}

impl CountingBackend {
    fn releases_of(&self, id: u64) -> usize {
        self.releases.lock().get(&id).copied().unwrap_or(0)
    }

    fn constructed(&self) -> u64 {
        *self.next.lock()
    }
}

impl IndexBackend for CountingBackend {
    type Handle = Counted;

    fn construct(&self, path: &Path) -> Result<Counted> {
        if path.ends_with("broken") {
            return Err(LabelError::Construct {
                path: path.to_path_buf(),
                reason: "broken source".to_string(),
            });
        }
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        Ok(Counted { id })
    }

    fn validate(&self, handle: &Counted) -> Result<()> {
        // Every tenth handle comes out corrupt.
        if handle.id % 10 == 9 {
            return Err(LabelError::Construct {
                path: "corrupt".into(),
                reason: format!("handle {} failed validation", handle.id),
            });
        }
        Ok(())
    }

    fn query(&self, handle: &Counted, _window: &Window) -> Result<Vec<Record>> {
        assert_eq!(self.releases_of(handle.id), 0, "query on released handle");
        Ok(Vec::new())
    }

    fn release(&self, handle: Counted) {
        *self.releases.lock().entry(handle.id).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone)]
enum Op {
    Acquire(usize),
    Reload(usize),
    BrokenReload(usize),
    AcquireMissing,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize).prop_map(Op::Acquire),
        (0..3usize).prop_map(Op::Reload),
        (0..3usize).prop_map(Op::BrokenReload),
        Just(Op::AcquireMissing),
    ]
}

const NAMES: [&str; 3] = ["city", "bike", "hike"];

proptest! {
    #[test]
    fn registry_matches_model(ops in proptest::collection::vec(op(), 1..60)) {
        let backend = Arc::new(CountingBackend::default());
        let mut registry = ResourceRegistry::new(Arc::clone(&backend));

        let mut current: HashMap<&str, u64> = HashMap::new();
        let mut generations: HashMap<&str, u64> = HashMap::new();
        for name in NAMES {
            let handle = backend.construct(Path::new(name)).unwrap();
            current.insert(name, handle.id);
            generations.insert(name, 0);
            registry.register(name, handle).unwrap();
        }

        for op in ops {
            match op {
                Op::Acquire(i) => {
                    let name = NAMES[i];
                    let lease = registry.acquire(name).unwrap();
                    prop_assert_eq!(lease.id, current[name]);
                    prop_assert_eq!(lease.generation(), generations[name]);
                    let window = Window {
                        x_min: 0.0,
                        x_max: 1.0,
                        y_min: 0.0,
                        y_max: 1.0,
                        t_min: 0.0,
                    };
                    prop_assert!(backend.query(&lease, &window).is_ok());
                }
                Op::Reload(i) => {
                    let name = NAMES[i];
                    let before = current[name];
                    let candidate = backend.constructed();
                    match registry.reload_from_path(name, Path::new(name)) {
                        Ok(swapped) => {
                            *generations.get_mut(name).unwrap() += 1;
                            current.insert(name, candidate);
                            prop_assert_eq!(swapped.generation, generations[name]);
                            prop_assert_eq!(backend.releases_of(before), 1);
                        }
                        Err(_) => {
                            // Rejected by validation: candidate released, old kept.
                            prop_assert_eq!(candidate % 10, 9);
                            prop_assert_eq!(backend.releases_of(candidate), 1);
                            prop_assert_eq!(backend.releases_of(before), 0);
                        }
                    }
                }
                Op::BrokenReload(i) => {
                    let name = NAMES[i];
                    let constructed = backend.constructed();
                    let result = registry.reload_from_path(name, Path::new("broken"));
                    prop_assert!(
                        matches!(result, Err(LabelError::Construct { .. })),
                        "broken reload did not report a construct error"
                    );
                    prop_assert_eq!(backend.constructed(), constructed);
                    prop_assert_eq!(registry.generation(name).unwrap(), generations[name]);
                }
                Op::AcquireMissing => {
                    prop_assert!(matches!(
                        registry.acquire("missing"),
                        Err(LabelError::NotFound(_))
                    ));
                }
            }
        }

        for name in NAMES {
            prop_assert_eq!(backend.releases_of(current[name]), 0);
        }

        drop(registry);
        for id in 0..backend.constructed() {
            prop_assert_eq!(backend.releases_of(id), 1, "handle {} not released exactly once", id);
        }
    }
}
