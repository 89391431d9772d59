use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use http::Method;
use tracing::{Instrument, debug, info_span, warn};

use crate::response::Response;

/// Runs `next` inside a `request` span and logs how it ended.
///
/// Server errors are logged at `warn`, everything else at `debug`, so the
/// default `info` filter stays quiet on the happy path.
pub(crate) async fn trace<F>(method: &Method, path: &str, peer: SocketAddr, next: F) -> Response
where
    F: Future<Output = Response>,
{
    let span = info_span!("request", %method, path, %peer);

    async move {
        let started = Instant::now();
        let response = next.await;
        let status = response.status_code();
        let latency = started.elapsed();

        if status.is_server_error() {
            warn!(status = status.as_u16(), ?latency, "request failed");
        } else {
            debug!(status = status.as_u16(), ?latency, "request finished");
        }
        response
    }
    .instrument(span)
    .await
}
