//! Controllers and the per-request context they act on.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::db::Orm;
use crate::http::request::Request;
use crate::http::response::{HttpError, Reply};
use crate::inflect;
use crate::routing::RouteMatch;

/// Per-request state handed to filters and actions.
pub struct Context {
    pub route: RouteMatch,
    pub request: Request,
    orm: Arc<Orm>,
    full_base: String,
    vars: serde_json::Map<String, serde_json::Value>,
    output: String,
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

impl Context {
    pub fn new(route: RouteMatch, request: Request, orm: Arc<Orm>, full_base: impl Into<String>) -> Self {
        Self {
            route,
            request,
            orm,
            full_base: full_base.into(),
            vars: serde_json::Map::new(),
            output: String::new(),
            status: None,
            headers: Vec::new(),
        }
    }

    pub fn orm(&self) -> &Orm {
        &self.orm
    }

    pub fn action(&self) -> &str {
        self.route.action()
    }

    /// Positional route parameters.
    pub fn args(&self) -> &[String] {
        &self.route.params
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.route.params.get(index).map(String::as_str)
    }

    /// Named route parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.route.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.request.query.get(name).map(String::as_str)
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.request.body).map_err(|e| HttpError::bad_request(e.to_string()))
    }

    /// Set a view variable. Values that fail to serialize become null.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> &mut Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            tracing::warn!(key = %key, error = %e, "View variable did not serialize");
            serde_json::Value::Null
        });
        self.vars.insert(key.to_string(), value);
        self
    }

    pub fn vars(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.vars
    }

    /// Append to the output buffer.
    pub fn write(&mut self, text: &str) -> &mut Self {
        self.output.push_str(text);
        self
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Set `Location` (relative targets are prefixed with the full base)
    /// and, when given, the status.
    pub fn redirect(&mut self, url: &str, status: Option<u16>) -> &mut Self {
        let location = inflect::full_url(&self.full_base, url);
        tracing::debug!(location = %location, "Redirecting");
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case("location"));
        self.headers.push(("Location".to_string(), location));
        if let Some(status) = status {
            self.status = Some(status);
        }
        self
    }

    /// Output buffer when non-empty, otherwise view variables as JSON.
    /// A redirect without a status answers 302.
    pub fn into_reply(self) -> Reply {
        let redirect = self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case("location"));
        let default_status = if redirect { 302 } else { 200 };
        let status = self.status.unwrap_or(default_status);

        let (content_type, body) = if !self.output.is_empty() || (redirect && self.vars.is_empty()) {
            ("text/html; charset=utf-8", self.output.into_bytes())
        } else {
            let body = serde_json::to_vec(&self.vars).unwrap_or_else(|_| b"{}".to_vec());
            ("application/json", body)
        };
        Reply {
            status,
            content_type: content_type.to_string(),
            headers: self.headers,
            body,
        }
    }
}

/// A set of actions reachable through routes.
pub trait Controller: Send + Sync {
    /// Names of the actions this controller exposes.
    fn actions(&self) -> &[&'static str];

    fn before_filter(&self, _ctx: &mut Context) -> Result<(), HttpError> {
        Ok(())
    }

    /// Run `action`. Only names listed by `actions` reach this.
    fn invoke(&self, action: &str, ctx: &mut Context) -> Result<(), HttpError>;

    fn after_filter(&self, _ctx: &mut Context) -> Result<(), HttpError> {
        Ok(())
    }
}

/// Controllers keyed by `package/controller` (package may be empty).
#[derive(Default)]
pub struct Controllers {
    controllers: HashMap<String, Arc<dyn Controller>>,
}

impl Controllers {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(package: Option<&str>, name: &str) -> String {
        format!("{}/{}", package.unwrap_or("").to_lowercase(), name.to_lowercase())
    }

    pub fn register(&mut self, package: Option<&str>, name: &str, controller: impl Controller + 'static) {
        let key = Self::key(package, name);
        tracing::debug!(controller = %key, "Controller registered");
        self.controllers.insert(key, Arc::new(controller));
    }

    pub fn get(&self, package: Option<&str>, name: &str) -> Option<Arc<dyn Controller>> {
        self.controllers.get(&Self::key(package, name)).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DataSources, SchemaCache};
    use std::collections::BTreeMap;

    fn context() -> Context {
        let route = RouteMatch {
            named: BTreeMap::from([("action".to_string(), "view".to_string())]),
            params: vec!["7".to_string()],
            rule: "/posts/:action".to_string(),
            extension: None,
        };
        let orm = Arc::new(Orm::new(DataSources::default(), SchemaCache::new()));
        Context::new(route, Request::get("/posts/view/7?tab=2"), orm, "http://example.com")
    }

    #[test]
    fn test_view_vars_render_as_json() {
        let mut ctx = context();
        assert_eq!(ctx.arg(0), Some("7"));
        assert_eq!(ctx.query("tab"), Some("2"));
        ctx.set("id", 7).set("tags", ["a", "b"]);
        let reply = ctx.into_reply();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type, "application/json");
        assert_eq!(reply.text(), r#"{"id":7,"tags":["a","b"]}"#);
    }

    #[test]
    fn test_output_buffer_wins() {
        let mut ctx = context();
        ctx.set("ignored", true).write("<p>").write("hi</p>");
        let reply = ctx.into_reply();
        assert_eq!(reply.content_type, "text/html; charset=utf-8");
        assert_eq!(reply.text(), "<p>hi</p>");
    }

    #[test]
    fn test_redirect_makes_location_absolute() {
        let mut ctx = context();
        ctx.redirect("/login", None);
        let reply = ctx.into_reply();
        assert_eq!(reply.status, 302);
        assert_eq!(reply.header("location"), Some("http://example.com/login"));

        let mut ctx = context();
        ctx.redirect("https://other.org/x", Some(301));
        let reply = ctx.into_reply();
        assert_eq!(reply.status, 301);
        assert_eq!(reply.header("Location"), Some("https://other.org/x"));
    }

    struct Noop;

    impl Controller for Noop {
        fn actions(&self) -> &[&'static str] {
            &["index"]
        }

        fn invoke(&self, _action: &str, _ctx: &mut Context) -> Result<(), HttpError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_keys_include_package() {
        let mut controllers = Controllers::new();
        controllers.register(None, "Posts", Noop);
        controllers.register(Some("admin"), "posts", Noop);
        assert_eq!(controllers.len(), 2);
        assert!(controllers.get(None, "posts").is_some());
        assert!(controllers.get(Some("Admin"), "posts").is_some());
        assert!(controllers.get(Some("shop"), "posts").is_none());
    }
}
