//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] can carry an *on-sent* hook. It runs exactly once, after
//! hyper has taken the whole body for writing, or when the body is dropped
//! because the connection went away first. That is the point where the
//! request is over from the caller's side.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use http_body::{Body, Frame, SizeHint};
use http_body_util::Full;

type OnSent = Box<dyn FnOnce() + Send + 'static>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use publish::Response;
///
/// Response::text("7\n");
/// Response::text("invalid request\n").with_status(StatusCode::BAD_REQUEST);
/// Response::status(StatusCode::NOT_FOUND);
/// ```
pub struct Response {
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
    on_sent: Option<OnSent>,
}

impl Response {
    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: Some(TEXT_PLAIN),
            body: Bytes::from(body.into()),
            on_sent: None,
        }
    }

    /// Response with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, content_type: None, body: Bytes::new(), on_sent: None }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Runs `hook` once the response has been handed to the transport.
    ///
    /// Replaces any hook set earlier.
    pub fn on_sent(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_sent = Some(Box::new(hook));
        self
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn body(&self) -> &Bytes { &self.body }

    pub(crate) fn into_http(mut self) -> http::Response<ResponseBody> {
        let mut response = http::Response::new(ResponseBody {
            inner: Full::new(std::mem::take(&mut self.body)),
            on_sent: self.on_sent.take(),
        });
        *response.status_mut() = self.status;
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

// A response dropped before conversion never reaches the client; the hook
// still runs so whatever it guards is not lost.
impl Drop for Response {
    fn drop(&mut self) {
        if let Some(hook) = self.on_sent.take() {
            hook();
        }
    }
}

// ── ResponseBody ─────────────────────────────────────────────────────────────

/// Body handed to hyper. Fires the on-sent hook at end of stream or on drop,
/// whichever comes first.
///
/// hyper polls the body until it yields `None`, then drops it. A client that
/// hangs up mid-response skips the `None` and goes straight to the drop.
/// Taking the hook out of the `Option` is what keeps the two paths from
/// both running it.
pub(crate) struct ResponseBody {
    inner: Full<Bytes>,
    on_sent: Option<OnSent>,
}

impl ResponseBody {
    fn fire(&mut self) {
        if let Some(hook) = self.on_sent.take() {
            hook();
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        // `Full` and the boxed hook are both `Unpin`, so no pin projection
        // is needed.
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        // `None` is end of stream: hyper has every byte of the body.
        if frame.is_none() {
            this.fire();
        }
        Poll::Ready(frame)
    }

    // Lets hyper skip the final poll when the body is already spent. The
    // hook then runs from `Drop` instead.
    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    // Exact for `Full`, so hyper sends `content-length` rather than chunking.
    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        self.fire();
    }
}

// ── IntoResponse ─────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`]. Implemented by error types that
/// know which status and body the client should see.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http_body_util::BodyExt;

    use super::*;

    fn counting_hook() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        (count, move || {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn text_sets_status_and_content_type() {
        let response = Response::text("3\n").into_http();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_PLAIN);
    }

    #[test]
    fn bare_status_has_no_content_type() {
        let response = Response::status(StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());

        let response = response.into_http();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn hook_fires_once_when_body_is_fully_read() {
        let (count, hook) = counting_hook();
        let response = Response::text("42\n").on_sent(hook).into_http();

        let body = response.into_body();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(bytes, "42\n");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_fires_when_body_is_dropped_unsent() {
        let (count, hook) = counting_hook();
        let response = Response::text("1\n").on_sent(hook).into_http();

        drop(response);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_moves_with_conversion_and_runs_once() {
        let (count, hook) = counting_hook();
        let response = Response::text("1\n").on_sent(hook);
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let response = response.into_http();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(response);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hook_fires_when_response_is_dropped_before_conversion() {
        let (count, hook) = counting_hook();
        drop(Response::text("1\n").on_sent(hook));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
