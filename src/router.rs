//! Radix-tree request router.
//!
//! One tree per HTTP method. A request that matches no tree is answered
//! with `404 Not Found` by the server before any endpoint is involved, and
//! before its body is read.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{Endpoint, SharedEndpoint};

/// The application router. Build it once at startup and pass it to
/// [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<SharedEndpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers `endpoint` for a method + path pair. Returns `self` for
    /// chaining.
    ///
    /// # Panics
    ///
    /// Panics if the same method + path pair is registered twice, or the
    /// path is not valid `matchit` syntax. Both are wiring mistakes caught
    /// at startup.
    pub fn on(mut self, method: Method, path: &str, endpoint: Arc<dyn Endpoint>) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Returns the endpoint for `method` + `path`, if any. The clone is
    /// what lets the request outlive the borrow of the routing table.
    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<SharedEndpoint> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        Some(Arc::clone(matched.value))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
