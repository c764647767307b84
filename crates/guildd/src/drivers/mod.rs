//! Built-in professions served by the worker process.
//!
//! Three professions ship with the runtime so the registry can be driven end
//! to end without external bundles:
//!
//! - `upstream` (multiple): driver `static` publishes a fixed node list.
//! - `router` (multiple, depends on `upstream`): driver `http` maps a path
//!   prefix to an upstream worker.
//! - `output` (singleton): driver `stdout` writes one access line per
//!   request handled by the service listeners.
//!
//! Workers publish their live state into a shared [`Gateway`] that the
//! service listeners consult for every connection.

mod output;
mod router;
mod upstream;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use guild_workers::{Driver, Profession, ProfessionMode, Professions, WorkerError};

pub use self::output::{OUTPUT_PROFESSION, STDOUT_DRIVER, StdoutConfig};
pub use self::router::{HTTP_DRIVER, HttpRouterConfig, ROUTER_PROFESSION};
pub use self::upstream::{STATIC_DRIVER, StaticConfig, UPSTREAM_PROFESSION, UPSTREAM_SKILL};

const DRIVERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::drivers");

/// Route published by a router worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Path prefix the route matches.
    pub path: String,
    /// Id of the upstream worker serving the route.
    pub upstream: String,
}

/// Outcome of resolving a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Router worker whose route matched.
    pub router: String,
    /// Upstream node chosen for the request.
    pub node: String,
}

#[derive(Debug, Default)]
struct Pool {
    nodes: Vec<String>,
    cursor: AtomicUsize,
}

impl Pool {
    fn next(&self) -> Option<&String> {
        if self.nodes.is_empty() {
            return None;
        }
        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.nodes.get(turn.checked_rem(self.nodes.len()).unwrap_or_default())
    }
}

/// Live routing state shared by built-in workers and service listeners.
#[derive(Debug, Default)]
pub struct Gateway {
    pools: RwLock<BTreeMap<String, Pool>>,
    routes: RwLock<BTreeMap<String, Route>>,
    access_log: AtomicBool,
}

impl Gateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a request path to a router and an upstream node.
    ///
    /// The longest matching path prefix wins; nodes of the selected upstream
    /// are used in turn.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<Resolution> {
        let routes = read(&self.routes);
        let (router, route) = routes
            .iter()
            .filter(|(_, route)| path.starts_with(route.path.as_str()))
            .max_by_key(|(_, route)| route.path.len())?;
        let pools = read(&self.pools);
        let node = pools.get(&route.upstream)?.next()?.clone();
        Some(Resolution {
            router: router.clone(),
            node,
        })
    }

    /// Whether an `output` worker asked for access lines.
    #[must_use]
    pub fn access_log_enabled(&self) -> bool {
        self.access_log.load(Ordering::Relaxed)
    }

    /// Routes currently published, keyed by router id.
    #[must_use]
    pub fn routes(&self) -> BTreeMap<String, Route> {
        read(&self.routes).clone()
    }

    /// Node list published by an upstream worker.
    #[must_use]
    pub fn nodes(&self, upstream: &str) -> Option<Vec<String>> {
        read(&self.pools).get(upstream).map(|pool| pool.nodes.clone())
    }

    pub(crate) fn publish_pool(&self, upstream: &str, nodes: Vec<String>) {
        write(&self.pools).insert(
            upstream.to_owned(),
            Pool {
                nodes,
                cursor: AtomicUsize::new(0),
            },
        );
    }

    pub(crate) fn withdraw_pool(&self, upstream: &str) {
        write(&self.pools).remove(upstream);
    }

    pub(crate) fn publish_route(&self, router: &str, route: Route) {
        write(&self.routes).insert(router.to_owned(), route);
    }

    pub(crate) fn withdraw_route(&self, router: &str) {
        write(&self.routes).remove(router);
    }

    pub(crate) fn set_access_log(&self, enabled: bool) {
        self.access_log.store(enabled, Ordering::Relaxed);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Builds the catalog of built-in professions over a shared gateway.
///
/// # Errors
///
/// Returns [`WorkerError::DuplicateCatalogEntry`] if two built-ins collide.
pub fn builtin_professions(gateway: &Arc<Gateway>) -> Result<Professions, WorkerError> {
    let mut professions = Professions::new();
    professions.register(
        Profession::new(UPSTREAM_PROFESSION, ProfessionMode::Multiple)
            .with_driver(Arc::new(upstream::StaticDriver::new(Arc::clone(gateway))) as Arc<dyn Driver>)?,
    )?;
    professions.register(
        Profession::new(ROUTER_PROFESSION, ProfessionMode::Multiple)
            .with_driver(Arc::new(router::HttpDriver::new(Arc::clone(gateway))) as Arc<dyn Driver>)?
            .with_labels(["path"])
            .depends_on([UPSTREAM_PROFESSION]),
    )?;
    professions.register(
        Profession::new(OUTPUT_PROFESSION, ProfessionMode::Singleton)
            .with_driver(Arc::new(output::StdoutDriver::new(Arc::clone(gateway))) as Arc<dyn Driver>)?,
    )?;
    Ok(professions)
}
