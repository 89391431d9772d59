//! Error types.
//!
//! Two families live here. [`Error`] covers infrastructure failures that
//! stop the service from starting: binding the port or opening the storage
//! directory. [`PublishError`] covers a single publish request and knows how
//! to turn itself into an HTTP [`Response`](crate::Response).

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use http::StatusCode;
use thiserror::Error;

use crate::allocator::BlobId;
use crate::response::{IntoResponse, Response};

/// Startup failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The storage directory could not be created or opened.
    #[error("storage directory {} unavailable: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The transport could not deliver the request body as plain bytes
/// (malformed chunked encoding, connection dropped mid-body, ...).
#[derive(Debug, Error)]
#[error("malformed request body: {0}")]
pub struct BodyError(String);

impl BodyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<hyper::Error> for BodyError {
    fn from(e: hyper::Error) -> Self {
        Self(e.to_string())
    }
}

/// Why a publish request did not produce a blob.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Rejected before an id was allocated. Nothing was stored.
    #[error("invalid request")]
    InvalidRequest(#[from] BodyError),

    /// The id was allocated but the content could not be written.
    /// The id is burned; it is never handed out again.
    #[error("failed to persist blob {id}: {source}")]
    Persistence {
        id: BlobId,
        #[source]
        source: io::Error,
    },
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidRequest(_) => {
                Response::text("invalid request\n").with_status(StatusCode::BAD_REQUEST)
            }
            Self::Persistence { .. } => {
                Response::text("internal error\n").with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
