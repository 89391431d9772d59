//! Endpoints: what the router dispatches to.
//!
//! # How an endpoint is stored
//!
//! The router keeps one `Arc<dyn Endpoint>` per route. The same instance,
//! and whatever state it owns (for [`Publisher`](crate::Publisher): the id
//! counter, the store, the expiry handle), is shared by every connection
//! task. Cloning the `Arc` per request is one atomic increment.
//!
//! ```text
//! Arc<Publisher>                         ← built once in main
//!        ↓ router.on(Method::POST, "/", publisher)
//! Arc<dyn Endpoint>                      ← stored in the matchit tree
//!        ↓ endpoint.call(req) per request
//! Publisher::handle(req) → Response      ← one vtable dispatch, boxed future
//! ```
//!
//! An endpoint never sees a request whose route did not match, and it always
//! gets the body already buffered (or the reason it could not be).

use std::sync::Arc;

use async_trait::async_trait;

use crate::request::Request;
use crate::response::Response;

/// A routed request handler.
///
/// Failures are answered with a [`Response`], never returned as errors, so
/// the server has nothing to translate.
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn call(&self, req: Request) -> Response;
}

/// An endpoint shared across connection tasks.
pub(crate) type SharedEndpoint = Arc<dyn Endpoint>;
