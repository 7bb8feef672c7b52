//! Connection acquisition: idle pool, DNS, TCP dial, proxy tunnel and TLS.
//!
//! Every phase reports into the caller's [`PhaseTrace`].

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, SocketAddr},
    sync::Mutex,
};

use bytes::Bytes;
use http::Uri;
use http_body_util::Full;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use socket2::{SockRef, TcpKeepalive};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
    time::Instant,
};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tokio_util::either::Either;
use tracing::{debug, warn};

use crate::{
    error::Error,
    options::{
        ClientOptions, DIAL_TIMEOUT, IDLE_CONN_TIMEOUT, MAX_IDLE_PER_HOST,
        TLS_HANDSHAKE_TIMEOUT,
    },
    proxy::{Proxy, ProxyConfig},
    tls::insecure_client_config,
    trace::{ConnInfo, PhaseTrace},
};

type Stream = Either<TcpStream, TlsStream<TcpStream>>;
pub(crate) type Sender = SendRequest<Full<Bytes>>;

/// Upper bound on a proxy's CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Scheme {
    Http,
    Https,
}

/// Where a request is headed, split out of its URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Target {
    pub scheme: Scheme,
    /// Host without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn from_uri(uri: &Uri) -> Result<Self, Error> {
        let scheme = match uri.scheme_str() {
            Some(s) if s.eq_ignore_ascii_case("http") => Scheme::Http,
            Some(s) if s.eq_ignore_ascii_case("https") => Scheme::Https,
            other => {
                return Err(Error::UnsupportedScheme(
                    other.unwrap_or_default().to_owned(),
                ));
            }
        };
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::UnsupportedScheme(format!("{uri} has no host")))?
            .trim_matches(['[', ']'])
            .to_owned();
        let port = uri.port_u16().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        Ok(Self { scheme, host, port })
    }

    pub fn host_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// A connection ready to carry one request.
pub(crate) struct Connection {
    pub sender: Sender,
    pub target: Target,
    /// Plain http through a forward proxy: the request line must carry the
    /// absolute URI.
    pub forward_proxy: Option<Proxy>,
}

struct IdleConn {
    sender: Sender,
    forward_proxy: Option<Proxy>,
    idle_since: Instant,
}

impl IdleConn {
    fn reusable(&self) -> bool {
        !self.sender.is_closed() && self.idle_since.elapsed() <= IDLE_CONN_TIMEOUT
    }
}

/// Drops closed and expired connections, and every host left without any.
fn prune(idle: &mut HashMap<Target, Vec<IdleConn>>) {
    idle.retain(|_, entries| {
        entries.retain(IdleConn::reusable);
        !entries.is_empty()
    });
}

pub(crate) struct Transport {
    options: ClientOptions,
    proxy: ProxyConfig,
    tls: TlsConnector,
    idle: Mutex<HashMap<Target, Vec<IdleConn>>>,
}

impl Transport {
    pub fn new(options: ClientOptions, proxy: ProxyConfig) -> Self {
        Self {
            options,
            proxy,
            tls: TlsConnector::from(insecure_client_config()),
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> ClientOptions {
        self.options
    }

    /// Hands out a pooled connection for `target`, or opens a new one.
    pub async fn connect(
        &self,
        target: &Target,
        trace: &mut PhaseTrace,
    ) -> Result<Connection, Error> {
        trace.get_conn(&target.host_port());

        while let Some(idle) = self.checkout(target) {
            let idle_time = idle.idle_since.elapsed();
            let mut sender = idle.sender;
            if sender.ready().await.is_ok() {
                debug!(host = %target.host_port(), ?idle_time, "reusing pooled connection");
                trace.got_conn(&ConnInfo::pooled(idle_time));
                return Ok(Connection {
                    sender,
                    target: target.clone(),
                    forward_proxy: idle.forward_proxy,
                });
            }
        }

        let proxy = self.proxy.for_target(target).cloned();
        let (dial_host, dial_port) = match &proxy {
            Some(p) => (p.host.as_str(), p.port),
            None => (target.host.as_str(), target.port),
        };
        let tcp = self.dial(dial_host, dial_port, trace).await?;

        let (stream, forward_proxy) = match (target.scheme, proxy) {
            (Scheme::Http, proxy) => (Either::Left(tcp), proxy),
            (Scheme::Https, Some(proxy)) => {
                let tunnel = open_tunnel(tcp, target, &proxy).await?;
                (Either::Right(self.handshake_tls(tunnel, &target.host).await?), None)
            }
            (Scheme::Https, None) => {
                (Either::Right(self.handshake_tls(tcp, &target.host).await?), None)
            }
        };

        let sender = spawn_http1(stream, target).await?;
        trace.got_conn(&ConnInfo::fresh());

        Ok(Connection {
            sender,
            target: target.clone(),
            forward_proxy,
        })
    }

    /// Returns a connection to the idle pool once its response is drained.
    pub fn release(&self, conn: Connection) {
        if self.options.disable_keep_alive || conn.sender.is_closed() {
            return;
        }
        let Ok(mut idle) = self.idle.lock() else {
            return;
        };
        prune(&mut idle);
        let entries = idle.entry(conn.target).or_default();
        if entries.len() >= MAX_IDLE_PER_HOST {
            return;
        }
        entries.push(IdleConn {
            sender: conn.sender,
            forward_proxy: conn.forward_proxy,
            idle_since: Instant::now(),
        });
    }

    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .map(|idle| idle.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    fn checkout(&self, target: &Target) -> Option<IdleConn> {
        if self.options.disable_keep_alive {
            return None;
        }
        let mut idle = self.idle.lock().ok()?;
        prune(&mut idle);
        let entries = idle.get_mut(target)?;
        let entry = entries.pop();
        if entries.is_empty() {
            idle.remove(target);
        }
        entry
    }

    async fn dial(
        &self,
        host: &str,
        port: u16,
        trace: &mut PhaseTrace,
    ) -> Result<TcpStream, Error> {
        // The dial timeout covers name resolution too.
        let deadline = Instant::now() + DIAL_TIMEOUT;
        let addrs = match host.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) => {
                trace.dns_start(host);
                let looked_up =
                    lookup_within(deadline, tokio::net::lookup_host((host, port))).await;
                trace.dns_done(looked_up.as_deref());
                looked_up.map_err(|source| Error::Dns {
                    host: host.to_owned(),
                    source,
                })?
            }
        };

        let mut last_err = None;
        for addr in addrs {
            let addr_str = addr.to_string();
            trace.connect_start("tcp", &addr_str);
            let attempt = tokio::time::timeout_at(deadline, TcpStream::connect(addr))
                .await
                .unwrap_or_else(|_| {
                    Err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"))
                });
            trace.connect_done("tcp", &addr_str, attempt.as_ref().err());
            match attempt {
                Ok(stream) => {
                    self.tune_socket(&stream);
                    return Ok(stream);
                }
                Err(source) => {
                    debug!(%addr, error = %source, "dial attempt failed");
                    let timed_out = source.kind() == io::ErrorKind::TimedOut;
                    last_err = Some(Error::Connect {
                        addr: addr_str,
                        source,
                    });
                    if timed_out {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Connect {
            addr: format!("{host}:{port}"),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses to dial"),
        }))
    }

    fn tune_socket(&self, stream: &TcpStream) {
        if let Err(err) = stream.set_nodelay(true) {
            warn!(error = %err, "failed to set TCP_NODELAY");
        }
        if let Some(interval) = self.options.keep_alive() {
            let keepalive = TcpKeepalive::new().with_time(interval);
            if let Err(err) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
                warn!(error = %err, "failed to enable TCP keep-alive");
            }
        }
    }

    async fn handshake_tls(
        &self,
        tcp: TcpStream,
        host: &str,
    ) -> Result<TlsStream<TcpStream>, Error> {
        let tls_err = |source| Error::Tls {
            host: host.to_owned(),
            source,
        };
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|e| tls_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, self.tls.connect(server_name, tcp))
            .await
            .map_err(|_| {
                tls_err(io::Error::new(io::ErrorKind::TimedOut, "tls handshake timeout"))
            })?
            .map_err(tls_err)
    }
}

/// Awaits a name lookup until `deadline`. An empty answer is an error.
async fn lookup_within<I>(
    deadline: Instant,
    lookup: impl Future<Output = io::Result<I>>,
) -> io::Result<Vec<SocketAddr>>
where
    I: Iterator<Item = SocketAddr>,
{
    let addrs: Vec<_> = tokio::time::timeout_at(deadline, lookup)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dns lookup timeout"))??
        .collect();
    if addrs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no addresses found"));
    }
    Ok(addrs)
}

/// Performs the HTTP/1.1 handshake and spawns the task driving the
/// connection. The task ends when the connection closes.
async fn spawn_http1(stream: Stream, target: &Target) -> Result<Sender, Error> {
    let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
    let host_port = target.host_port();
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            debug!(host = %host_port, error = ?err, "connection closed with error");
        }
    });
    Ok(sender)
}

/// Asks `proxy` to open a raw tunnel to `target` with `CONNECT`.
async fn open_tunnel(
    mut tcp: TcpStream,
    target: &Target,
    proxy: &Proxy,
) -> Result<TcpStream, Error> {
    let proxy_err = |reason: String| Error::Proxy {
        proxy: proxy.host_port(),
        reason,
    };
    let authority = target.host_port();
    let mut head = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(auth) = &proxy.authorization {
        head.push_str(&format!("Proxy-Authorization: {auth}\r\n"));
    }
    head.push_str("\r\n");
    tcp.write_all(head.as_bytes())
        .await
        .map_err(|e| proxy_err(format!("writing CONNECT: {e}")))?;

    let mut response = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];
    loop {
        let n = tcp
            .read(&mut chunk)
            .await
            .map_err(|e| proxy_err(format!("reading CONNECT response: {e}")))?;
        if n == 0 {
            return Err(proxy_err("closed before answering CONNECT".to_owned()));
        }
        response.extend_from_slice(&chunk[..n]);
        if response.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if response.len() > MAX_CONNECT_RESPONSE {
            return Err(proxy_err("CONNECT response head too large".to_owned()));
        }
    }

    let status_line = String::from_utf8_lossy(&response);
    let status_line = status_line.lines().next().unwrap_or_default();
    match status_line.split_whitespace().nth(1) {
        Some("200") => Ok(tcp),
        _ => Err(proxy_err(format!("CONNECT rejected: {status_line}"))),
    }
}
