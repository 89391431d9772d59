//! The publish-and-expire lifecycle.
//!
//! Per request: validate → allocate id → persist → respond → arm expiry.
//! Each step finishes before the next begins. Across requests nothing is
//! ordered; every request is its own chain of suspensions on the runtime.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::allocator::{BlobId, IdAllocator};
use crate::error::{BodyError, PublishError};
use crate::expiry::ExpiryScheduler;
use crate::handler::Endpoint;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::store::BlobStore;

/// Accepts blobs, stores them and hands them to the expiry scheduler.
pub struct Publisher {
    ids: IdAllocator,
    store: Arc<dyn BlobStore>,
    expiry: ExpiryScheduler,
}

/// Proof that a blob is durably stored. Its deletion has not been armed
/// yet; see [`Receipt::schedule_expiry`].
#[must_use = "a blob whose expiry is never scheduled is never deleted"]
#[derive(Debug)]
pub struct Receipt {
    id: BlobId,
    expiry: ExpiryScheduler,
}

impl Receipt {
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// Arms deletion one retention window from now. Returns the deadline.
    pub fn schedule_expiry(self) -> Instant {
        self.expiry.schedule(self.id)
    }
}

impl Publisher {
    pub fn new(store: Arc<dyn BlobStore>, expiry: ExpiryScheduler) -> Self {
        Self { ids: IdAllocator::new(), store, expiry }
    }

    /// Validates and persists one blob.
    ///
    /// An unreadable body is rejected before any id is taken. Once an id is
    /// taken it is never reused, even if persistence then fails.
    pub async fn accept(&self, body: Result<Bytes, BodyError>) -> Result<Receipt, PublishError> {
        let content = body?;
        let size = content.len();

        // Never awaits between reading and bumping the counter.
        let id = self.ids.next();

        self.store
            .put(id, content)
            .await
            .map_err(|source| PublishError::Persistence { id, source })?;

        debug!(%id, size, "blob stored");
        Ok(Receipt { id, expiry: self.expiry.clone() })
    }

    /// Stores `content` and arms its expiry straight away.
    pub async fn publish(&self, content: Bytes) -> Result<BlobId, PublishError> {
        let receipt = self.accept(Ok(content)).await?;
        let id = receipt.id();
        receipt.schedule_expiry();
        Ok(id)
    }

    /// `POST /`. Replies with `"<id>\n"`; the expiry clock starts once that
    /// reply has been handed to the transport.
    pub async fn handle(&self, req: Request) -> Response {
        match self.accept(req.into_body()).await {
            Ok(receipt) => Response::text(format!("{}\n", receipt.id())).on_sent(move || {
                receipt.schedule_expiry();
            }),
            Err(e) => {
                match &e {
                    PublishError::InvalidRequest(reason) => debug!(%reason, "rejected publish"),
                    PublishError::Persistence { id, source } => {
                        error!(%id, error = %source, "failed to store blob");
                    }
                }
                e.into_response()
            }
        }
    }
}

#[async_trait]
impl Endpoint for Publisher {
    async fn call(&self, req: Request) -> Response {
        self.handle(req).await
    }
}
