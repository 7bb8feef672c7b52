//! Per-request record of connection lifecycle phases.
//!
//! The transport holds a `&mut PhaseTrace` while it acquires a connection and
//! calls the matching update for every phase it reaches. Each phase is
//! recorded at most once; later updates for the same phase are ignored.

use std::{fmt, io, net::SocketAddr, time::Duration};

/// Facts about the connection handed to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnInfo {
    /// The connection came out of the idle pool.
    pub reused: bool,
    /// The connection sat idle before being handed out.
    pub was_idle: bool,
    /// How long it sat idle. Zero for fresh connections.
    pub idle_time: Duration,
}

impl ConnInfo {
    pub(crate) fn fresh() -> Self {
        Self::default()
    }

    pub(crate) fn pooled(idle_time: Duration) -> Self {
        Self {
            reused: true,
            was_idle: true,
            idle_time,
        }
    }
}

/// Human readable strings for each connection phase of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseTrace {
    get_conn: Option<String>,
    dns_start: Option<String>,
    dns_done: Option<String>,
    connect_start: Option<String>,
    connect_done: Option<String>,
    got_conn: Option<String>,
}

fn set_once(slot: &mut Option<String>, render: impl FnOnce() -> String) {
    if slot.is_none() {
        *slot = Some(render());
    }
}

impl PhaseTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection for `host_port` is about to be acquired.
    pub fn get_conn(&mut self, host_port: &str) {
        set_once(&mut self.get_conn, || {
            format!("Starting to create conn : [{host_port}], ")
        });
    }

    pub fn dns_start(&mut self, host: &str) {
        set_once(&mut self.dns_start, || {
            format!("starting to look up dns : [{host}], ")
        });
    }

    pub fn dns_done(&mut self, result: Result<&[SocketAddr], &io::Error>) {
        set_once(&mut self.dns_done, || match result {
            Ok(addrs) => format!("done looking up dns : [addrs: {addrs:?}, err: None], "),
            Err(err) => format!("done looking up dns : [addrs: [], err: {err:?}], "),
        });
    }

    pub fn connect_start(&mut self, network: &str, addr: &str) {
        set_once(&mut self.connect_start, || {
            format!("starting tcp connection : [{network}, {addr}], ")
        });
    }

    pub fn connect_done(&mut self, network: &str, addr: &str, err: Option<&io::Error>) {
        set_once(&mut self.connect_done, || {
            format!("tcp connection created [{network}, {addr}, {err:?}], ")
        });
    }

    pub fn got_conn(&mut self, info: &ConnInfo) {
        set_once(&mut self.got_conn, || format!("conn was reused: [{info:?}]"));
    }

    fn phases(&self) -> [&Option<String>; 6] {
        [
            &self.get_conn,
            &self.dns_start,
            &self.dns_done,
            &self.connect_start,
            &self.connect_done,
            &self.got_conn,
        ]
    }

    /// Number of phases that were reached.
    pub fn recorded(&self) -> usize {
        self.phases().iter().filter(|p| p.is_some()).count()
    }

    pub fn dns_done_text(&self) -> Option<&str> {
        self.dns_done.as_deref()
    }

    pub fn connect_done_text(&self) -> Option<&str> {
        self.connect_done.as_deref()
    }

    pub fn got_conn_text(&self) -> Option<&str> {
        self.got_conn.as_deref()
    }
}

/// Concatenation of all six phases in lifecycle order. Phases that never
/// fired contribute nothing.
impl fmt::Display for PhaseTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for phase in self.phases() {
            f.write_str(phase.as_deref().unwrap_or_default())?;
        }
        Ok(())
    }
}
