//! HTTP listener — accepts requests and answers each on its own thread.

use std::io::{self, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{debug, error, info};

use super::routes::{handle, ApiResponse, ServerState};
use crate::backend::IndexBackend;
use crate::error::{LabelError, Result};

/// Bound HTTP listener.
pub struct HttpServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

impl HttpServer {
    /// Bind on all interfaces at `port` (0 picks a free port).
    pub fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let server =
            Server::http(addr).map_err(|e| LabelError::Io(io::Error::other(e.to_string())))?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle that can stop [`serve`](Self::serve) from another thread.
    pub fn stopper(&self) -> HttpStopper {
        HttpStopper {
            server: Arc::clone(&self.server),
        }
    }

    /// Accept requests until stopped.
    pub fn serve<B: IndexBackend>(&self, state: Arc<ServerState<B>>) {
        info!(addr = %self.addr, root = %state.root, "listening for label requests");

        for request in self.server.incoming_requests() {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                if let Err(e) = respond(request, &state) {
                    debug!(error = %e, "client handler error");
                }
            });
        }

        info!("http listener stopped");
    }
}

/// Unblocks a running [`HttpServer::serve`] loop.
#[derive(Clone)]
pub struct HttpStopper {
    server: Arc<Server>,
}

impl HttpStopper {
    pub fn stop(&self) {
        self.server.unblock();
    }
}

fn respond<B: IndexBackend>(request: Request, state: &ServerState<B>) -> io::Result<()> {
    let method = request.method().to_string();
    let url = request.url().to_string();

    let ApiResponse { status, body } = handle(state, &method, &url);
    debug!(%method, %url, status, "request handled");

    let data = body.to_string().into_bytes();
    let length = data.len();
    let response = Response::new(
        StatusCode(status),
        headers(),
        Cursor::new(data),
        Some(length),
        None,
    );
    request.respond(response).map_err(|e| {
        error!(error = %e, "failed to write response");
        e
    })
}

fn headers() -> Vec<Header> {
    [
        ("Content-Type", "application/json"),
        ("Access-Control-Allow-Origin", "*"),
    ]
    .iter()
    .filter_map(|(k, v)| Header::from_bytes(k.as_bytes(), v.as_bytes()).ok())
    .collect()
}
