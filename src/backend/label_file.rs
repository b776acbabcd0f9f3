//! Plain-text label file backend.
//!
//! One label per line, whitespace separated:
//!
//! ```text
//! # x        y         t     id         prio  lbl_fac  label
//! 13.404954  52.520008 0.25  240109189  3     1.5      Berlin Mitte
//! ```
//!
//! Everything after the sixth column is the label text. Blank lines and
//! lines starting with `#` are skipped. Queries are a linear scan; the
//! interesting part of the server is the registry, not this index.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::{IndexBackend, Record, Window};
use crate::error::{LabelError, Result};

/// An in-memory label set loaded from one file.
#[derive(Debug)]
pub struct LabelIndex {
    source: PathBuf,
    records: Vec<Record>,
}

impl LabelIndex {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Backend that reads label files into memory.
#[derive(Debug, Default)]
pub struct LabelFileBackend {
    live: AtomicUsize,
}

impl LabelFileBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles constructed and not yet released.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl IndexBackend for LabelFileBackend {
    type Handle = LabelIndex;

    fn construct(&self, path: &Path) -> Result<LabelIndex> {
        let source = fs::read_to_string(path).map_err(|e| LabelError::Construct {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let records = parse_records(&source).map_err(|reason| LabelError::Construct {
            path: path.to_path_buf(),
            reason,
        })?;

        self.live.fetch_add(1, Ordering::AcqRel);
        info!(path = %path.display(), labels = records.len(), "label index constructed");

        Ok(LabelIndex {
            source: path.to_path_buf(),
            records,
        })
    }

    fn query(&self, handle: &LabelIndex, window: &Window) -> Result<Vec<Record>> {
        Ok(handle
            .records
            .iter()
            .filter(|r| window.contains(r))
            .cloned()
            .collect())
    }

    fn release(&self, handle: LabelIndex) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(path = %handle.source.display(), "label index released");
    }
}

/// Parse the whole file, reporting the first bad line.
fn parse_records(source: &str) -> std::result::Result<Vec<Record>, String> {
    let mut records = Vec::new();

    for (lineno, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = parse_line(line).map_err(|e| format!("line {}: {}", lineno + 1, e))?;
        records.push(record);
    }

    Ok(records)
}

fn parse_line(line: &str) -> std::result::Result<Record, String> {
    let mut rest = line;
    let mut columns = [""; 6];

    for (i, slot) in columns.iter_mut().enumerate() {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Err(format!("expected 7 columns, found {}", i));
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        *slot = &rest[..end];
        rest = &rest[end..];
    }

    let text = rest.trim();
    if text.is_empty() {
        return Err("missing label text".to_string());
    }

    let float = |idx: usize, field: &str| -> std::result::Result<f64, String> {
        columns[idx]
            .parse::<f64>()
            .map_err(|_| format!("{} is not a number: {:?}", field, columns[idx]))
    };

    Ok(Record {
        x: float(0, "x")?,
        y: float(1, "y")?,
        t: float(2, "t")?,
        id: columns[3]
            .parse()
            .map_err(|_| format!("id is not an integer: {:?}", columns[3]))?,
        priority: columns[4]
            .parse()
            .map_err(|_| format!("prio is not an integer: {:?}", columns[4]))?,
        label_factor: float(5, "lbl_fac")?,
        text: text.to_string(),
    })
}
