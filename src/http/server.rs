//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum router with the catch-all dispatch handler
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Run dispatch on the blocking pool
//! - Swap the route table when a new config arrives
//! - Stop on the shutdown broadcast

use axum::{
    body::Body,
    extract::State,
    http::{Request as HttpRequest, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AppConfig, ServerConfig};
use crate::http::dispatch::Dispatcher;
use crate::http::request::{strip_base, parse_query, Request, UuidRequestId, X_REQUEST_ID};
use crate::routing::Router as RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub base_path: String,
    pub max_body_size: usize,
}

pub struct HttpServer {
    app: Router,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    pub fn new(config: &ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let state = AppState {
            dispatcher: Arc::clone(&dispatcher),
            base_path: config.base_path.clone(),
            max_body_size: config.max_body_size,
        };
        Self {
            app: Self::build_router(config, state),
            dispatcher,
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(dispatch_handler))
            .route("/{*path}", any(dispatch_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(RequestBodyLimitLayer::new(config.max_body_size))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered application, for serving or in-process testing.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serve until `shutdown` fires. New configs on `config_updates`
    /// replace the route table; other sections need a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<AppConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(apply_config_updates(Arc::clone(&self.dispatcher), updates));
        }

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(dispatcher: Arc<Dispatcher>, mut updates: mpsc::UnboundedReceiver<AppConfig>) {
    while let Some(config) = updates.recv().await {
        match RouteTable::from_config(&config.routes, &config.router) {
            Ok(router) => dispatcher.swap_router(router),
            Err(e) => tracing::error!(error = %e, "Rejected route table, keeping current routes"),
        }
    }
}

async fn dispatch_handler(State(state): State<AppState>, request: HttpRequest<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request Entity Too Large").into_response();
        }
    };

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let request = Request {
        method: parts.method.to_string(),
        path: strip_base(parts.uri.path(), &state.base_path).to_string(),
        query: parse_query(parts.uri.query().unwrap_or("")),
        request_id: parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        headers,
        body,
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
        Ok(reply) => reply.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
