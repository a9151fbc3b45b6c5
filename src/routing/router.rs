//! Route registration and lookup.
//!
//! # Responsibilities
//! - Compile route rules into per-segment matchers
//! - Look up the first route matching a request path
//! - Return the extracted parameters or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (shared through `ArcSwap` by the server)
//! - O(n) scan in registration order; first match wins, no specificity scoring
//! - `/` is the default route and is answered without scanning
//! - Segments beyond the rule become positional parameters

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{RouteConfig, RouterConfig};
use crate::routing::matcher::{LiteralMatcher, PatternMatcher, SegmentMatcher};

/// Error raised while registering a route.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route '{rule}': invalid requirement for '{name}': {source}")]
    InvalidRequirement {
        rule: String,
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Default values attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defaults {
    named: BTreeMap<String, String>,
    args: Vec<String>,
}

impl Defaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a named default (`controller`, `action`, `package`, ...).
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Append a positional default.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// One position of a compiled rule.
#[derive(Debug, Default)]
struct RuleSegment {
    name: Option<String>,
    matcher: Option<Box<dyn SegmentMatcher>>,
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    rule: String,
    named: BTreeMap<String, String>,
    args: Vec<String>,
    segments: Vec<RuleSegment>,
}

impl Route {
    /// The rule this route was registered with.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Named segment names in rule order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| s.name.as_deref())
    }

    fn check(&self, segments: &[&str]) -> Option<RouteMatch> {
        for (i, rule_segment) in self.segments.iter().enumerate() {
            if let Some(matcher) = &rule_segment.matcher {
                let segment = segments.get(i)?;
                if !matcher.matches(segment) {
                    return None;
                }
            }
        }

        let mut named = self.named.clone();
        let mut params = self.args.clone();
        for (i, segment) in segments.iter().enumerate() {
            match self.segments.get(i) {
                Some(RuleSegment { name: Some(name), .. }) => {
                    named.insert(name.clone(), segment.to_string());
                }
                Some(RuleSegment { matcher: Some(_), .. }) => {}
                _ => params.push(segment.to_string()),
            }
        }

        Some(RouteMatch {
            named,
            params,
            rule: self.rule.clone(),
            extension: None,
        })
    }
}

/// The result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    /// Named parameters: defaults merged with extracted named segments.
    pub named: BTreeMap<String, String>,
    /// Positional parameters: positional defaults then unnamed segments.
    pub params: Vec<String>,
    /// The matched rule.
    pub rule: String,
    /// Extension of the last path segment (e.g. "html"). Only recognized
    /// extensions are stripped before matching.
    pub extension: Option<String>,
}

impl RouteMatch {
    pub fn controller(&self) -> Option<&str> {
        self.named.get("controller").map(String::as_str)
    }

    pub fn action(&self) -> &str {
        self.named.get("action").map(String::as_str).unwrap_or("")
    }

    pub fn package(&self) -> Option<&str> {
        self.named
            .get("package")
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }
}

/// Ordered route table.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
    default_route: Option<RouteMatch>,
    extensions: Vec<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create an empty router recognizing the `.html` extension.
    pub fn new() -> Self {
        Self::with_extensions(vec!["html".to_string()])
    }

    /// Create an empty router recognizing the given extensions.
    pub fn with_extensions(extensions: Vec<String>) -> Self {
        Self {
            routes: Vec::new(),
            default_route: None,
            extensions,
        }
    }

    /// Build a router from config, registering routes in declaration order.
    pub fn from_config(routes: &[RouteConfig], config: &RouterConfig) -> Result<Self, RouteError> {
        let mut router = Self::with_extensions(config.extensions.clone());
        for route in routes {
            let mut defaults = Defaults::new();
            for (name, value) in &route.defaults {
                defaults = defaults.set(name, value);
            }
            for arg in &route.args {
                defaults = defaults.arg(arg);
            }
            router.connect(&route.rule, defaults, &route.requirements)?;
        }
        tracing::debug!(routes = router.len(), "Route table built");
        Ok(router)
    }

    /// Register a route.
    ///
    /// Segments starting with `:` are named; a requirement for that name
    /// constrains the segment. Other segments are literals.
    pub fn connect<K, V>(
        &mut self,
        rule: &str,
        defaults: Defaults,
        requirements: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), RouteError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut named = BTreeMap::from([("action".to_string(), "index".to_string())]);
        named.extend(defaults.named);

        if rule == "/" {
            self.default_route = Some(RouteMatch {
                named,
                params: Vec::new(),
                rule: rule.to_string(),
                extension: None,
            });
            return Ok(());
        }

        let requirements: BTreeMap<String, String> = requirements
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        let mut segments = Vec::new();
        for segment in rule.trim_matches('/').split('/') {
            if segment.is_empty() {
                segments.push(RuleSegment::default());
                continue;
            }
            let Some(name) = segment.strip_prefix(':') else {
                segments.push(RuleSegment {
                    name: None,
                    matcher: Some(Box::new(LiteralMatcher::new(segment))),
                });
                continue;
            };

            let matcher: Option<Box<dyn SegmentMatcher>> = match requirements.get(name) {
                Some(pattern) => Some(Box::new(PatternMatcher::new(pattern).map_err(|source| {
                    RouteError::InvalidRequirement {
                        rule: rule.to_string(),
                        name: name.to_string(),
                        source,
                    }
                })?)),
                None => None,
            };
            segments.push(RuleSegment {
                name: Some(name.to_string()),
                matcher,
            });
        }

        self.routes.push(Route {
            rule: rule.to_string(),
            named,
            args: defaults.args,
            segments,
        });
        Ok(())
    }

    /// Find the first route matching `path`.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        if path == "/" {
            if let Some(default) = &self.default_route {
                return Some(default.clone());
            }
        }

        let mut path = path.trim().trim_matches('/');
        let extension = path_extension(path);
        if let Some(ext) = extension.filter(|ext| self.extensions.iter().any(|e| e == ext)) {
            path = &path[..path.len() - ext.len() - 1];
        }

        let segments: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };

        let found = self.routes.iter().find_map(|route| route.check(&segments));
        match found {
            Some(mut result) => {
                result.extension = extension.map(str::to_string);
                tracing::trace!(rule = %result.rule, "Route matched");
                Some(result)
            }
            None => None,
        }
    }

    /// Registered routes, excluding the default route.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of registered routes, excluding the default route.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.default_route.is_none()
    }
}

fn path_extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_REQUIREMENTS: [(&str, &str); 0] = [];

    fn classic() -> Router {
        let mut router = Router::new();
        router
            .connect("/", Defaults::new().set("controller", "pages"), NO_REQUIREMENTS)
            .unwrap();
        router
            .connect(
                "/blog/:id",
                Defaults::new().set("controller", "posts").set("action", "view"),
                [("id", "[0-9]+")],
            )
            .unwrap();
        router
            .connect("/:controller/:action", Defaults::new(), NO_REQUIREMENTS)
            .unwrap();
        router
    }

    #[test]
    fn test_default_route() {
        let m = classic().match_path("/").unwrap();
        assert_eq!(m.controller(), Some("pages"));
        assert_eq!(m.action(), "index");
        assert_eq!(m.rule, "/");
        assert!(m.params.is_empty());
    }

    #[test]
    fn test_first_registered_wins() {
        let m = classic().match_path("/blog/42").unwrap();
        assert_eq!(m.rule, "/blog/:id");
        assert_eq!(m.get("id"), Some("42"));
        assert_eq!(m.action(), "view");
    }

    #[test]
    fn test_constraint_failure_falls_through() {
        let m = classic().match_path("/blog/latest").unwrap();
        assert_eq!(m.rule, "/:controller/:action");
        assert_eq!(m.controller(), Some("blog"));
        assert_eq!(m.action(), "latest");
    }

    #[test]
    fn test_literal_is_case_insensitive() {
        let m = classic().match_path("/BLOG/7").unwrap();
        assert_eq!(m.rule, "/blog/:id");
        assert_eq!(m.get("id"), Some("7"));
    }

    #[test]
    fn test_trailing_segments_become_positional() {
        let m = classic().match_path("/posts/edit/5/draft").unwrap();
        assert_eq!(m.controller(), Some("posts"));
        assert_eq!(m.action(), "edit");
        assert_eq!(m.params, vec!["5".to_string(), "draft".to_string()]);
    }

    #[test]
    fn test_missing_unconstrained_segment_keeps_default() {
        let m = classic().match_path("/posts").unwrap();
        assert_eq!(m.controller(), Some("posts"));
        assert_eq!(m.action(), "index");
    }

    #[test]
    fn test_missing_literal_position_is_no_match() {
        let mut router = Router::new();
        router
            .connect("/admin/users", Defaults::new().set("controller", "users"), NO_REQUIREMENTS)
            .unwrap();
        assert!(router.match_path("/admin").is_none());
        assert!(router.match_path("/users").is_none());
        assert!(router.match_path("/admin/users").is_some());
    }

    #[test]
    fn test_extension_is_stripped_and_reported() {
        let m = classic().match_path("/blog/42.html").unwrap();
        assert_eq!(m.get("id"), Some("42"));
        assert_eq!(m.extension.as_deref(), Some("html"));

        // Unknown extensions stay part of the segment but are reported.
        let m = classic().match_path("/posts/feed.xml").unwrap();
        assert_eq!(m.action(), "feed.xml");
        assert_eq!(m.extension.as_deref(), Some("xml"));

        let m = classic().match_path("/posts/index").unwrap();
        assert_eq!(m.extension, None);
    }

    #[test]
    fn test_empty_path_matches_unconstrained_routes() {
        let mut router = Router::new();
        router
            .connect("/:controller/:action", Defaults::new().set("action", "index"), NO_REQUIREMENTS)
            .unwrap();
        let m = router.match_path("").unwrap();
        assert_eq!(m.rule, "/:controller/:action");
        assert_eq!(m.get("controller"), None);
        assert_eq!(m.action(), "index");

        let mut strict = Router::new();
        strict
            .connect("/:controller/:action", Defaults::new(), [("controller", "[a-z]+")])
            .unwrap();
        assert!(strict.match_path("").is_none());
        assert!(strict.match_path("/").is_none());
    }

    #[test]
    fn test_positional_defaults_come_first() {
        let mut router = Router::new();
        router
            .connect(
                "/pages",
                Defaults::new().set("controller", "pages").set("action", "display").arg("home"),
                NO_REQUIREMENTS,
            )
            .unwrap();
        let m = router.match_path("/pages/about").unwrap();
        assert_eq!(m.params, vec!["home".to_string(), "about".to_string()]);
    }

    #[test]
    fn test_no_routes_no_match() {
        let router = Router::new();
        assert!(router.is_empty());
        assert!(router.match_path("/").is_none());
        assert!(router.match_path("/anything").is_none());
    }

    #[test]
    fn test_invalid_requirement_is_rejected() {
        let mut router = Router::new();
        let err = router
            .connect("/x/:id", Defaults::new(), [("id", "(")])
            .unwrap_err();
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_from_config() {
        let routes = vec![RouteConfig {
            rule: "/archive/:year".into(),
            defaults: [("controller".to_string(), "posts".to_string())].into(),
            args: vec![],
            requirements: [("year".to_string(), "[12][0-9]{3}".to_string())].into(),
        }];
        let router = Router::from_config(&routes, &RouterConfig::default()).unwrap();
        let m = router.match_path("/archive/2013").unwrap();
        assert_eq!(m.get("year"), Some("2013"));
        assert!(router.match_path("/archive/13").is_none());
    }
}
