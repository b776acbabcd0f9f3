//! label-server - serve map labels with live reload.
//!
//! Usage:
//!   label-server                                  # default.json on :8080
//!   label-server --endpoints labels.json --port 9000
//!   label-server --config server.toml --no-watch  # static mode, no reload

use anyhow::{Context, Result};
use clap::Parser;
use label_server::server::{HttpServer, ServerState};
use label_server::{
    build_registry, load_sources, LabelFileBackend, ReloadCoordinator, ResourceRegistry,
    ServerSettings, WatchOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "label-server")]
#[command(about = "Serve map labels from hot-reloadable label files", long_about = None)]
struct Cli {
    /// Server settings file (TOML). Flags override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the file with label files and the endpoints where they are supplied
    #[arg(short, long)]
    endpoints: Option<PathBuf>,

    /// Port where the server is reachable
    #[arg(short, long)]
    port: Option<u16>,

    /// Endpoint name prefix for all label collections
    #[arg(long)]
    root: Option<String>,

    /// Path to renderd.conf, used to list tile endpoints
    #[arg(long)]
    renderd: Option<PathBuf>,

    /// Quiet period in milliseconds before a changed file is reloaded
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Serve the startup data only; do not watch for changes
    #[arg(long)]
    no_watch: bool,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "label_server=trace"
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings(&self) -> Result<ServerSettings> {
        let mut settings = match &self.config {
            Some(path) => ServerSettings::load(path)?,
            None => ServerSettings::default(),
        };

        if let Some(endpoints) = &self.endpoints {
            settings.endpoints = endpoints.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(root) = &self.root {
            settings.root = root.clone();
        }
        if let Some(renderd) = &self.renderd {
            settings.renderd = renderd.clone();
        }
        if let Some(debounce_ms) = self.debounce_ms {
            settings.debounce_ms = debounce_ms;
        }
        if self.no_watch {
            settings.watch = false;
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings()?;

    let sources = load_sources(&settings.endpoints).context("read config failed, no endpoints set")?;

    let backend = Arc::new(LabelFileBackend::new());
    let registry = Arc::new(build_registry(backend, &sources));
    if registry.is_empty() {
        warn!("no endpoint could be initialized, serving empty collections");
    }

    let coordinator = if settings.watch {
        let options = WatchOptions {
            debounce_ms: settings.debounce_ms,
            queue: settings.reload_queue,
        };
        let coordinator = ReloadCoordinator::start(Arc::clone(&registry), &sources, options)
            .context("cannot watch label files; use --no-watch to serve without live reload")?;
        Some(coordinator)
    } else {
        info!("live reload disabled, serving startup data only");
        None
    };

    let server = HttpServer::bind(settings.port)
        .with_context(|| format!("cannot listen on port {}", settings.port))?;
    let stopper = server.stopper();
    let state = Arc::new(ServerState {
        registry: Arc::clone(&registry),
        root: settings.root_segment().to_string(),
        renderd: settings.renderd.clone(),
    });
    info!(
        port = settings.port,
        root = %settings.root_segment(),
        endpoints = registry.len(),
        "socket startup"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let mut listener = tokio::task::spawn_blocking(move || server.serve(state));
        tokio::select! {
            _ = shutdown_signal() => {
                info!("shutting down");
                stopper.stop();
                listener.await.context("http listener panicked")?;
            }
            result = &mut listener => {
                result.context("http listener panicked")?;
                warn!("http listener exited on its own");
            }
        }
        Ok::<_, anyhow::Error>(())
    })?;

    if let Some(coordinator) = coordinator {
        coordinator.stop();
    }
    ResourceRegistry::shutdown(registry);
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
