//! Middleware layer.
//!
//! Cross-cutting concerns wrapped around every dispatched request.
//!
//! - [`trace`]: per-request span with method, path and peer; logs status
//!   and latency when the endpoint finishes

mod trace;

pub(crate) use trace::trace;
