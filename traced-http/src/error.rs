use std::{io, time::Duration};

/// Everything that can go wrong while building, sending or reading a request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("unsupported url scheme: {0:?}")]
    UnsupportedScheme(String),

    #[error("dns lookup for {host} failed")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("tcp connect to {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake with {host} failed")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("proxy {proxy} failed: {reason}")]
    Proxy { proxy: String, reason: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("http protocol error")]
    Http(#[from] hyper::Error),

    #[error("reading response body failed")]
    BodyRead(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{addr} unreachable")]
    Unreachable {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Whether the failure happened after the response head arrived, while
    /// draining the body.
    pub fn is_body_read(&self) -> bool {
        matches!(self, Error::BodyRead(_))
    }

    /// Whether the failure happened before any request was put on the wire.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Error::InvalidRequest(_) | Error::UnsupportedScheme(_))
    }
}
