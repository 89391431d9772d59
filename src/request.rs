//! Incoming HTTP request type.

use bytes::Bytes;

use crate::error::BodyError;

/// A routed request with its body already buffered.
///
/// Routing has been decided by the time an endpoint sees this, so only the
/// body is left. If the transport could not deliver it as bytes, the
/// endpoint still gets the request and sees the failure in
/// [`Request::into_body`].
pub struct Request {
    body: Result<Bytes, BodyError>,
}

impl Request {
    pub(crate) fn new(body: Result<Bytes, BodyError>) -> Self {
        Self { body }
    }

    pub fn into_body(self) -> Result<Bytes, BodyError> {
        self.body
    }
}
