//! # traced-http
//!
//! An HTTP/1.1 client helper that records how each request got its
//! connection and how long the whole exchange took.
//!
//! For every call, the [`RequestExecutor`]:
//!  - picks a shared client for the call's [`ClientOptions`] from a [`ClientFactory`]
//!  - records connection acquisition, DNS, TCP connect and reuse into a [`PhaseTrace`]
//!  - drains the response body and measures the elapsed wall-clock time
//!  - writes one info line with the url, bodies, timings and trace to its [`Logger`]
//!
//! TLS certificates are **not** verified. Do not use this client where
//! certificate validation matters.
//!
//! ## Example
//! ```rust,no_run
//! use std::{collections::HashMap, sync::Arc};
//! use traced_http::{ClientFactory, RequestExecutor, TracingLogger};
//!
//! #[tokio::main]
//! async fn main() {
//!     let executor = RequestExecutor::new(ClientFactory::new(), Arc::new(TracingLogger));
//!
//!     let outcome = executor.get("http://example.org/", 5).await;
//!     println!("{} bytes in {} ms", outcome.body.len(), outcome.elapsed_millis);
//!
//!     let outcome = executor
//!         .post("http://example.org/echo", &HashMap::new(), "ping", 5)
//!         .await;
//!     assert!(outcome.error.is_none());
//! }
//! ```

mod client;
mod error;
mod executor;
mod logger;
mod options;
pub mod probe;
mod proxy;
mod tls;
mod trace;
mod transport;

pub use client::{ClientFactory, HttpClient};
pub use error::Error;
pub use executor::{ErrorPolicy, RequestExecutor, RequestOutcome, format_elapsed};
pub use logger::{Level, Logger, TracingLogger};
pub use options::{
    CallOptions, ClientOptions, DIAL_TIMEOUT, IDLE_CONN_TIMEOUT, MAX_IDLE_PER_HOST,
    TLS_HANDSHAKE_TIMEOUT,
};
pub use proxy::{Proxy, ProxyConfig};
pub use trace::{ConnInfo, PhaseTrace};
