//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server stops accepting connections and tells
//! every open connection to wind down: a request already being handled gets
//! its response, an idle keep-alive connection is closed straight away.
//! [`Server::serve`] returns once the last connection task has ended.
//!
//! Pending blob expiries are not part of the drain. They belong to the
//! [`ExpiryScheduler`](crate::ExpiryScheduler) and are abandoned when the
//! process exits.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http_body_util::{BodyExt, Collected};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{BodyError, Error};
use crate::middleware;
use crate::request::Request;
use crate::response::{Response, ResponseBody};
use crate::router::Router;

/// A bound HTTP server, ready to [`serve`](Server::serve).
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Binds the listening socket. Port `0` picks a free port; read it back
    /// with [`local_addr`](Server::local_addr).
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let bind_err = |source| Error::Bind { addr, source };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, router: Router) {
        self.serve_with_shutdown(router, shutdown_signal()).await;
    }

    /// Serves `router` until `signal` resolves, then drains.
    pub async fn serve_with_shutdown<S>(self, router: Router, signal: S)
    where
        S: Future<Output = ()>,
    {
        let Self { listener, addr } = self;
        let router = Arc::new(router);
        let mut connections = JoinSet::new();
        // Cancelled once, when the signal fires. Every connection task holds
        // a clone and switches to graceful shutdown when it trips.
        let draining = CancellationToken::new();

        info!(%addr, "publish listening");

        // `select!` polls the signal by `&mut` on every iteration, so it has
        // to stay put in memory.
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so no new connection is taken once
                // the signal has fired.
                biased;

                () = &mut signal => {
                    info!(in_flight = connections.len(), "shutdown signal received, draining connections");
                    draining.cancel();
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let draining = draining.clone();
                    // hyper speaks its own IO traits; TokioIo adapts the
                    // tokio stream to them.
                    let io = TokioIo::new(stream);

                    connections.spawn(async move {
                        // Called once per request on the connection. The
                        // router is shared, so each call only bumps a count.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, peer).await }
                        });

                        // The auto builder sniffs HTTP/1 vs HTTP/2 from the
                        // first bytes on the wire.
                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        // Pinned so it can be polled here and still be told
                        // to shut down afterwards.
                        tokio::pin!(conn);

                        let result = tokio::select! {
                            res = conn.as_mut() => res,
                            () = draining.cancelled() => {
                                debug!(%peer, "closing connection for shutdown");
                                // Finishes the request in progress, if any,
                                // and refuses the next one. An idle
                                // keep-alive connection closes at once.
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };

                        if let Err(e) = result {
                            error!(%peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections so the set does not grow forever.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        // Every task has been told to shut down, so this only waits for
        // responses that are already being produced.
        while connections.join_next().await.is_some() {}

        info!("publish stopped");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. Every failure becomes a
/// response, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<ResponseBody>, Infallible> {
    let (parts, body) = req.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_owned();

    let response = middleware::trace(&method, &path, peer, async move {
        // An unrouted request is answered without reading its body.
        let Some(endpoint) = router.lookup(&parts.method, parts.uri.path()) else {
            return Response::status(StatusCode::NOT_FOUND);
        };

        // Buffer the whole body; a transport-level failure is handed to the
        // endpoint instead of aborting the request.
        let body = body
            .collect()
            .await
            .map(Collected::to_bytes)
            .map_err(BodyError::from);

        endpoint.call(Request::new(body)).await
    })
    .await;

    Ok(response.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
