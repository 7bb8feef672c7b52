//! Plain TCP reachability check.

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::Error;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to `addr` (`host:port`) and closes the connection right away.
pub async fn dial(addr: &str, timeout: Duration) -> Result<(), Error> {
    let attempt = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .unwrap_or_else(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "i/o timeout",
            ))
        });

    match attempt {
        Ok(stream) => {
            debug!(addr, peer = ?stream.peer_addr().ok(), "site reachable");
            Ok(())
        }
        Err(source) => {
            warn!(addr, error = ?source, "site unreachable");
            Err(Error::Unreachable {
                addr: addr.to_owned(),
                source,
            })
        }
    }
}

pub async fn dial_default(addr: &str) -> Result<(), Error> {
    dial(addr, DEFAULT_PROBE_TIMEOUT).await
}
