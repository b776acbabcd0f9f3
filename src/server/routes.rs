//! Request dispatch — maps a method and URL onto a JSON response.
//!
//! Kept free of any HTTP library so the handlers can be exercised directly.
//! Query arguments are parsed before the registry is touched; a lease is
//! held only for the duration of the backend query.

use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::geojson::to_feature_collection;
use crate::backend::{IndexBackend, Window};
use crate::error::{LabelError, Result};
use crate::registry::ResourceRegistry;
use crate::tiles::{load_tile_endpoints, TileEndpoint};

/// Path of the collection listing.
pub const COLLECTIONS_PATH: &str = "labelCollections";

/// Shared state handed to every request.
pub struct ServerState<B: IndexBackend> {
    pub registry: Arc<ResourceRegistry<B>>,
    /// Path prefix of the label endpoints, without slashes.
    pub root: String,
    pub renderd: PathBuf,
}

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(500, format!("encoding failed: {}", e)),
        }
    }

    pub fn error(status: u16, msg: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::Value::String(msg.into()),
        }
    }
}

/// Where a request path leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<'a> {
    Labels { name: Option<Cow<'a, str>> },
    Collections,
    Unknown,
}

/// Split `url` into its route and raw query string.
///
/// The name segment is percent-decoded; one that decodes to invalid UTF-8
/// or to a path with a slash leads nowhere.
pub fn route<'a>(root: &str, url: &'a str) -> (Route<'a>, &'a str) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let mut segments = path.trim_start_matches('/').splitn(2, '/');

    let route = match (segments.next(), segments.next()) {
        (Some(COLLECTIONS_PATH), None) => Route::Collections,
        (Some(prefix), rest) if prefix == root => match rest {
            None | Some("") => Route::Labels { name: None },
            Some(name) if !name.contains('/') => match percent_decode_str(name).decode_utf8() {
                Ok(name) if !name.contains('/') => Route::Labels { name: Some(name) },
                _ => Route::Unknown,
            },
            Some(_) => Route::Unknown,
        },
        _ => Route::Unknown,
    };

    (route, query)
}

/// Parse the five window bounds from a query string.
pub fn parse_window(query: &str) -> Result<Window> {
    let mut params: HashMap<String, String> = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    let number = |key: &str| -> Result<f64> {
        params
            .get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .ok_or_else(|| LabelError::Query(format!("{} could not be parsed into a number", key)))
    };

    Ok(Window {
        x_min: number("x_min")?,
        x_max: number("x_max")?,
        y_min: number("y_min")?,
        y_max: number("y_max")?,
        t_min: number("t_min")?,
    })
}

/// Handle one request.
pub fn handle<B: IndexBackend>(state: &ServerState<B>, method: &str, url: &str) -> ApiResponse {
    if !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("HEAD") {
        return ApiResponse::error(405, "method not allowed");
    }

    match route(&state.root, url) {
        (Route::Labels { name }, query) => labels(state, name.as_deref(), query),
        (Route::Collections, _) => label_collections(state),
        (Route::Unknown, _) => ApiResponse::error(404, "not found"),
    }
}

fn labels<B: IndexBackend>(state: &ServerState<B>, name: Option<&str>, query: &str) -> ApiResponse {
    let window = match parse_window(query) {
        Ok(w) => w,
        Err(e) => return ApiResponse::error(400, e.to_string()),
    };

    let Some(name) = name else {
        return ApiResponse::error(404, "No data available. (endpoint name not set)");
    };

    let lease = match state.registry.acquire(name) {
        Ok(lease) => lease,
        Err(LabelError::NotFound(_)) => {
            return ApiResponse::error(404, "No data endpoint available. (endpoint does not exist)")
        }
        Err(e) => return ApiResponse::error(500, e.to_string()),
    };
    let generation = lease.generation();
    let result = state.registry.backend().query(lease.handle(), &window);
    lease.release();

    match result {
        Ok(records) => {
            debug!(name = %name, generation, labels = records.len(), "labels served");
            ApiResponse::ok(to_feature_collection(records))
        }
        Err(e) => {
            warn!(name = %name, error = %e, "label query failed");
            ApiResponse::error(500, e.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct LabelCollections {
    #[serde(rename = "pathPrefix")]
    path_prefix: String,
    endpoints: Vec<String>,
    #[serde(rename = "tileEndpoints")]
    tile_endpoints: Vec<TileEndpoint>,
}

fn label_collections<B: IndexBackend>(state: &ServerState<B>) -> ApiResponse {
    let tile_endpoints = match load_tile_endpoints(&state.renderd) {
        Ok(endpoints) => endpoints,
        Err(e) => {
            warn!(renderd = %state.renderd.display(), error = %e, "renderd config not parsed");
            Vec::new()
        }
    };

    ApiResponse::ok(LabelCollections {
        path_prefix: state.root.clone(),
        endpoints: state.registry.names().into_iter().collect(),
        tile_endpoints,
    })
}
