//! Server module — the HTTP face of the registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           label-server                  │
//! │  - registry (one slot per endpoint)     │
//! │  - reload coordinator (file watcher)    │
//! │  - HTTP listener, thread per request    │
//! └─────────────────────────────────────────┘
//!           ▲
//!           │ GET /{root}/{name}?x_min=..&t_min=..
//!           │ GET /labelCollections
//!           ▼
//! ┌─────────────────────────────────────────┐
//! │           map client                    │
//! │  - receives GeoJSON label features      │
//! └─────────────────────────────────────────┘
//! ```

pub mod geojson;
pub mod http;
pub mod routes;

pub use http::{HttpServer, HttpStopper};
pub use routes::{handle, parse_window, ApiResponse, ServerState};
