//! Incoming request data and request IDs.
//!
//! # Responsibilities
//! - Generate a UUID request ID for every request
//! - Strip the configured base path before routing
//! - Hand dispatch an owned, stack-independent view of the request

use std::collections::BTreeMap;

use axum::http::{HeaderValue, Request as HttpRequest};
use tower_http::request_id::{MakeRequestId, RequestId};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Issues a v4 UUID per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &HttpRequest<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Path relative to `base`. Paths outside the base are returned unchanged.
pub fn strip_base<'p>(path: &'p str, base: &str) -> &'p str {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return path;
    }
    match path.strip_prefix(base) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// What a controller sees of the request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    /// Path relative to the application base.
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub request_id: Option<String>,
}

impl Request {
    /// GET request for `uri` (path plus optional query string).
    pub fn get(uri: &str) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            query: parse_query(query),
            ..Self::default()
        }
    }

    /// Path and query string as received (relative to the base).
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_base() {
        assert_eq!(strip_base("/app/posts/1", "/app"), "/posts/1");
        assert_eq!(strip_base("/app", "/app/"), "/");
        assert_eq!(strip_base("/application", "/app"), "/application");
        assert_eq!(strip_base("/posts", ""), "/posts");
    }

    #[test]
    fn test_get_parses_query() {
        let request = Request::get("/posts?page=2&q=a%20b");
        assert_eq!(request.path, "/posts");
        assert_eq!(request.query.get("q").map(String::as_str), Some("a b"));
        assert_eq!(request.uri(), "/posts?page=2&q=a+b");
    }

    #[test]
    fn test_request_ids_are_unique() {
        let mut make = UuidRequestId;
        let req = HttpRequest::new(());
        let a = make.make_request_id(&req).unwrap();
        let b = make.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
