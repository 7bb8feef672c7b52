use std::time::Duration;

/// How long a single dial may take, independent of the request timeout.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections older than this are dropped instead of reused.
pub const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);

pub const MAX_IDLE_PER_HOST: usize = 2;

/// Client level settings. All durations are whole seconds.
///
/// Equal options share one client, see [`crate::ClientFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClientOptions {
    /// Overall request timeout. Zero disables it.
    pub timeout: u64,
    /// TCP keep-alive probe interval. Zero leaves the OS default.
    pub keep_alive: u64,
    /// Never pool connections and ask the server to close them.
    pub disable_keep_alive: bool,
}

impl ClientOptions {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive > 0).then(|| Duration::from_secs(self.keep_alive))
    }
}

/// Per call settings for [`crate::RequestExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Overall timeout in seconds. Zero disables it.
    pub timeout: u64,
    /// Close the connection once the response is consumed instead of
    /// returning it to the pool.
    pub close_after_use: bool,
}

impl CallOptions {
    pub fn new(timeout: u64) -> Self {
        Self {
            timeout,
            close_after_use: true,
        }
    }

    #[must_use]
    pub fn keep_open(self) -> Self {
        Self {
            close_after_use: false,
            ..self
        }
    }

    /// The client options this call runs with.
    ///
    /// A call that closes its connection gets a client without keep-alive,
    /// so the request flag and the client setting never disagree.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.timeout,
            keep_alive: 1,
            disable_keep_alive: self.close_after_use,
        }
    }
}
