//! # publish
//!
//! Ephemeral blob publishing over HTTP.
//!
//! `POST /` with any body. The bytes are written to the storage directory
//! under the next sequential id, the id comes back as `"<id>\n"`, and 24
//! hours later the entry is deleted. There is no way to read, list, extend
//! or delete a blob over HTTP.
//!
//! ```text
//! $ curl --data-binary @notes.txt http://localhost:8080/
//! 0
//! $ ls data/
//! 0
//! ```
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use publish::{BlobStore, ExpiryScheduler, FsStore, Publisher, RETENTION, Server, app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn BlobStore> = Arc::new(FsStore::open("data").await?);
//!     let expiry = ExpiryScheduler::spawn(Arc::clone(&store), RETENTION);
//!     let publisher = Arc::new(Publisher::new(store, expiry));
//!
//!     Server::bind("127.0.0.1:8080".parse()?).await?.serve(app(publisher)).await;
//!     Ok(())
//! }
//! ```
//!
//! Nothing is durable across restarts: ids start again at 0, and deletions
//! that were pending when the process stopped never happen.

mod allocator;
mod controller;
mod error;
mod expiry;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod middleware;
mod store;

pub mod config;

use std::sync::Arc;

use http::Method;

pub use allocator::{BlobId, IdAllocator};
pub use controller::{Publisher, Receipt};
pub use error::{BodyError, Error, PublishError};
pub use expiry::{ExpiryEvent, ExpiryScheduler, RETENTION};
pub use handler::Endpoint;
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use router::Router;
pub use server::Server;
pub use store::{BlobStore, FsStore, MemoryStore};

/// The service's routing table: `POST /` and nothing else.
pub fn app(publisher: Arc<Publisher>) -> Router {
    Router::new().on(Method::POST, "/", publisher)
}
