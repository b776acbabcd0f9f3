//! Tile endpoint discovery from renderd.conf.
//!
//! renderd uses an INI dialect: `[section]` headers, `KEY=value` pairs and
//! `;` comments. Every section carrying a `URI` is a tile layer the client
//! can pair with a label collection. Lines that fit none of these are
//! logged and skipped.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::{LabelError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEndpoint {
    pub name: String,
    pub uri: String,
    pub description: String,
}

/// Read tile endpoints from a renderd config file.
pub fn load_tile_endpoints(path: &Path) -> Result<Vec<TileEndpoint>> {
    let data = fs::read_to_string(path)
        .map_err(|e| LabelError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(parse_tile_endpoints(&data))
}

pub fn parse_tile_endpoints(source: &str) -> Vec<TileEndpoint> {
    let mut endpoints = Vec::new();
    let mut section: Option<Section> = None;

    for (lineno, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let Some(name) = header.strip_suffix(']') else {
                warn!(line = lineno + 1, "renderd: unterminated section header, skipped");
                continue;
            };
            if let Some(done) = section.take() {
                endpoints.extend(done.into_endpoint());
            }
            section = Some(Section::new(name.trim()));
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!(line = lineno + 1, "renderd: expected KEY=value, skipped");
            continue;
        };
        if let Some(current) = section.as_mut() {
            match key.trim() {
                "URI" => current.uri = Some(value.trim().to_string()),
                "DESCRIPTION" => current.description = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    if let Some(done) = section {
        endpoints.extend(done.into_endpoint());
    }

    endpoints
}

struct Section {
    name: String,
    uri: Option<String>,
    description: Option<String>,
}

impl Section {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            uri: None,
            description: None,
        }
    }

    fn into_endpoint(self) -> Option<TileEndpoint> {
        Some(TileEndpoint {
            uri: self.uri?,
            name: self.name,
            description: self.description.unwrap_or_default(),
        })
    }
}
