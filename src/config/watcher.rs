//! Configuration file watcher for hot reload.
//!
//! Only the route table is swapped on reload; database and cache settings
//! are read once at startup. A changed file whose `[router]` and
//! `[[routes]]` sections are unchanged is not forwarded.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{AppConfig, RouteConfig, RouterConfig};

/// The part of the config a reload can apply.
#[derive(Debug, Clone, PartialEq)]
struct RouteSection {
    router: RouterConfig,
    routes: Vec<RouteConfig>,
}

impl RouteSection {
    fn of(config: &AppConfig) -> Self {
        Self {
            router: config.router.clone(),
            routes: config.routes.clone(),
        }
    }
}

struct Reloader {
    path: PathBuf,
    updates: mpsc::UnboundedSender<AppConfig>,
    applied: Mutex<RouteSection>,
}

impl Reloader {
    fn reload(&self) -> bool {
        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current routes");
                return false;
            }
        };

        let section = RouteSection::of(&config);
        let mut applied = self.applied.lock().expect("watcher state mutex poisoned");
        if *applied == section {
            tracing::debug!(path = %self.path.display(), "Config changed outside the route table, ignored");
            return false;
        }

        tracing::info!(routes = section.routes.len(), "Route table changed on disk");
        *applied = section;
        self.updates.send(config).is_ok()
    }
}

/// Watches the config file and sends configs with a new route table.
pub struct ConfigWatcher {
    inner: Arc<Reloader>,
}

impl ConfigWatcher {
    /// `current` is the config already in use. Returns the watcher and
    /// the receiving end for updates.
    pub fn new(path: &Path, current: &AppConfig) -> (Self, mpsc::UnboundedReceiver<AppConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let inner = Reloader {
            path: path.to_path_buf(),
            updates,
            applied: Mutex::new(RouteSection::of(current)),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Re-read the file now; `true` when an update was sent.
    pub fn reload(&self) -> bool {
        self.inner.reload()
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let inner = Arc::clone(&self.inner);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    inner.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.inner.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.inner.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ROUTES: &str = r#"
[[routes]]
rule = "/:controller/:action"
"#;

    #[test]
    fn test_forwards_only_route_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poly.toml");
        fs::write(&path, ROUTES).unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path, &AppConfig::default());
        assert!(watcher.reload());
        assert_eq!(rx.try_recv().unwrap().routes.len(), 1);

        // Same routes, different log level.
        fs::write(&path, format!("{}\n[observability]\nlog_level = \"debug\"\n", ROUTES)).unwrap();
        assert!(!watcher.reload());
        assert!(rx.try_recv().is_err());

        fs::write(&path, format!("{}\n[[routes]]\nrule = \"/\"\n", ROUTES)).unwrap();
        assert!(watcher.reload());
        assert_eq!(rx.try_recv().unwrap().routes.len(), 2);

        fs::write(&path, "routes = 12").unwrap();
        assert!(!watcher.reload());
    }
}
