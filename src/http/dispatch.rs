//! Request dispatch: route lookup, controller resolution and the
//! filter/action/filter sequence.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

use crate::db::Orm;
use crate::http::controller::{Context, Controllers};
use crate::http::request::Request;
use crate::http::response::{HttpError, Reply};
use crate::observability::metrics;
use crate::routing::Router;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no matching route for '{0}'")]
    NoRoute(String),

    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("missing controller '{0}'")]
    MissingController(String),

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Builds the reply for a failed dispatch.
pub type NotFoundHandler = Box<dyn Fn(&Request, &DispatchError) -> Reply + Send + Sync>;

/// Routing failures answer 404; errors raised by filters and actions keep
/// their own status.
pub fn default_not_found(_request: &Request, err: &DispatchError) -> Reply {
    match err {
        DispatchError::Http(http) => http.clone().into_reply(),
        _ => HttpError::not_found("").into_reply(),
    }
}

pub struct Dispatcher {
    router: ArcSwap<Router>,
    controllers: Controllers,
    orm: Arc<Orm>,
    full_base: String,
    not_found: NotFoundHandler,
}

impl Dispatcher {
    pub fn new(router: Router, controllers: Controllers, orm: Arc<Orm>) -> Self {
        Self {
            router: ArcSwap::from_pointee(router),
            controllers,
            orm,
            full_base: String::new(),
            not_found: Box::new(default_not_found),
        }
    }

    /// Prefix for relative redirect targets.
    pub fn with_full_base(mut self, full_base: impl Into<String>) -> Self {
        self.full_base = full_base.into();
        self
    }

    pub fn with_not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request, &DispatchError) -> Reply + Send + Sync + 'static,
    {
        self.not_found = Box::new(handler);
        self
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.load_full()
    }

    /// Atomically replace the route table.
    pub fn swap_router(&self, router: Router) {
        let routes = router.len();
        self.router.store(Arc::new(router));
        tracing::info!(routes, "Route table swapped");
    }

    pub fn orm(&self) -> &Arc<Orm> {
        &self.orm
    }

    /// Dispatch and render; failures go through the not-found handler.
    pub fn dispatch(&self, request: Request) -> Reply {
        let start = Instant::now();
        let method = request.method.clone();
        let reply = match self.try_dispatch(request.clone()) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(path = %request.path, error = %err, "Dispatch failed");
                (self.not_found)(&request, &err)
            }
        };
        metrics::record_request(&method, reply.status, start);
        reply
    }

    pub fn try_dispatch(&self, request: Request) -> Result<Reply, DispatchError> {
        let router = self.router.load();
        let route = router
            .match_path(&request.path)
            .ok_or_else(|| DispatchError::NoRoute(request.path.clone()))?;

        let action = route.action().to_string();
        if action.is_empty() || action.starts_with('_') {
            return Err(DispatchError::InvalidAction(action));
        }

        let name = route.controller().unwrap_or_default().to_string();
        let package = route.package().map(str::to_string);
        let label = match &package {
            Some(package) => format!("{}/{}", package, name),
            None => name.clone(),
        };
        let controller = self
            .controllers
            .get(package.as_deref(), &name)
            .ok_or_else(|| DispatchError::MissingController(label.clone()))?;

        if !controller.actions().contains(&action.as_str()) {
            return Err(DispatchError::InvalidAction(format!("{}::{}", label, action)));
        }

        tracing::debug!(
            request_id = request.request_id.as_deref().unwrap_or("-"),
            controller = %label,
            action = %action,
            rule = %route.rule,
            "Dispatching"
        );

        let mut ctx = Context::new(route, request, Arc::clone(&self.orm), self.full_base.clone());
        controller.before_filter(&mut ctx)?;
        controller.invoke(&action, &mut ctx)?;
        controller.after_filter(&mut ctx)?;
        Ok(ctx.into_reply())
    }
}
