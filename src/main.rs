//! Poly application server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum + tower-http layers)
//!                          │
//!                          ▼
//!                     http::dispatch ──▶ routing::Router (ArcSwap, reloadable)
//!                          │
//!                          ▼
//!                     Controller::before_filter → action → after_filter
//!                          │
//!                          ▼
//!                     db::Orm ──▶ SQLite data sources ──▶ cache stores
//! ```
//!
//! Usage: `poly [config.toml]` (default `config/poly.toml`, or `POLY_CONFIG`).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use poly_web::cache::Caches;
use poly_web::config::watcher::ConfigWatcher;
use poly_web::config::{load_config, AppConfig, Settings};
use poly_web::db::Orm;
use poly_web::http::{Context, Controller, Controllers, Dispatcher, HttpError, HttpServer};
use poly_web::lifecycle::{signals, Shutdown};
use poly_web::observability::{logging, metrics};
use poly_web::routing::Router;

/// Built-in pages: a landing action and a health probe.
struct Pages {
    settings: Settings,
}

impl Controller for Pages {
    fn actions(&self) -> &[&'static str] {
        &["home", "health"]
    }

    fn invoke(&self, action: &str, ctx: &mut Context) -> Result<(), HttpError> {
        match action {
            "home" => {
                let site: String = self.settings.read_or("site.name", "Poly".to_string());
                ctx.set("site", site).set("version", env!("CARGO_PKG_VERSION"));
            }
            "health" => {
                let models = ctx.orm().models().len();
                ctx.set("status", "ok").set("models", models);
            }
            _ => return Err(HttpError::not_found(action)),
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("POLY_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/poly.toml"));
    let config = if path.exists() {
        load_config(&path)?
    } else {
        AppConfig::default()
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "poly starting");
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        bind_address = %config.server.bind_address,
        routes = config.routes.len(),
        databases = config.databases.len(),
        caches = config.cache.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let caches = Arc::new(Caches::new(config.cache.clone()));
    let orm = Arc::new(Orm::from_config(&config, &caches)?);
    let router = Router::from_config(&config.routes, &config.router)?;

    let mut controllers = Controllers::new();
    controllers.register(
        None,
        "pages",
        Pages {
            settings: Settings::new(config.settings.clone()),
        },
    );

    let dispatcher = Arc::new(
        Dispatcher::new(router, controllers, orm).with_full_base(config.server.full_base.clone()),
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let (watcher, updates) = ConfigWatcher::new(&path, &config);
    let _watcher = if path.exists() {
        match watcher.run() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config.server, dispatcher);
    server.run(listener, Some(updates), shutdown.subscribe()).await?;

    if let Err(e) = caches.flush_all() {
        tracing::error!(error = %e, "Failed to flush caches");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
