//! Standardized logging for traced-http binaries.
//!
//! Start with [`TelemetryConfig::new()`].

use std::{
    fs::{self, File, OpenOptions},
    io::{self, IsTerminal as _, Write as _},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install the global subscriber")]
    Init(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to open log file {}", path.display())]
    LogSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where log lines are appended besides stderr/journald.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSinkConfig {
    pub dir: PathBuf,
    /// File name without the `.log` extension.
    pub name: String,
}

impl LogSinkConfig {
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.name))
    }

    /// Opens the log file for appending, creating the directory if needed.
    pub fn open(&self) -> Result<File, TelemetryError> {
        let path = self.path();
        let err = |source| TelemetryError::LogSink {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(err)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(err)
    }
}

/// The toplevel config for the telemetry crate. Start here.
#[derive(Debug)]
pub struct TelemetryConfig {
    syslog_identifier: Option<String>,
    global_filter: EnvFilter,
    file_sink: Option<LogSinkConfig>,
}

impl TelemetryConfig {
    /// Logs at `INFO` and above unless `RUST_LOG` says otherwise.
    #[expect(clippy::new_without_default, reason = "may add required args later")]
    #[must_use]
    pub fn new() -> Self {
        Self {
            syslog_identifier: None,
            global_filter: EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
            file_sink: None,
        }
    }

    /// Enables journald, and uses the provided syslog identifier.
    ///
    /// If you run the application in a tty, stderr will be used instead.
    #[must_use]
    pub fn with_journald(self, syslog_identifier: &str) -> Self {
        Self {
            syslog_identifier: Some(syslog_identifier.to_owned()),
            ..self
        }
    }

    /// Override the global filter to a custom filter.
    #[must_use]
    pub fn with_global_filter(self, filter: EnvFilter) -> Self {
        Self {
            global_filter: filter,
            ..self
        }
    }

    /// Additionally append plain-text lines to a log file.
    #[must_use]
    pub fn with_file_sink(self, sink: LogSinkConfig) -> Self {
        Self {
            file_sink: Some(sink),
            ..self
        }
    }

    pub fn try_init(self) -> Result<TelemetryFlusher, TelemetryError> {
        // Checking for a terminal helps detect if we are running under systemd.
        let journald_layer = if !io::stderr().is_terminal() {
            self.syslog_identifier.and_then(|syslog_identifier| {
                tracing_journald::layer()
                    .inspect_err(|err| {
                        eprintln!(
                            "failed connecting to journald socket. \
                        will write to stderr: {err}"
                        );
                    })
                    .map(|layer| layer.with_syslog_identifier(syslog_identifier))
                    .ok()
            })
        } else {
            None
        };
        let stderr_layer = journald_layer
            .is_none()
            .then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));
        let file_layer = match &self.file_sink {
            Some(sink) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(sink.open()?)),
            ),
            None => None,
        };

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(journald_layer)
            .with(file_layer)
            .with(self.global_filter)
            .try_init()?;

        Ok(TelemetryFlusher { _priv: () })
    }

    /// Initializes the telemetry config. Call this only once, at the beginning of the
    /// program.
    ///
    /// Calling this more than once or when another tracing subscriber is registered
    /// will cause a panic.
    pub fn init(self) -> TelemetryFlusher {
        self.try_init()
            .expect("failed to initialize traced-http-telemetry")
    }
}

/// Allows flushing all telemetry logs.
#[must_use = "call .flush at the end of the program, otherwise logs may get lost"]
pub struct TelemetryFlusher {
    _priv: (),
}

impl TelemetryFlusher {
    /// Call this at the end of the program.
    pub fn flush(self) {
        io::stderr().flush().ok();
        io::stdout().flush().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_sink_creates_dir_and_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = LogSinkConfig::new(tmp.path().join("nested"), "access");
        assert_eq!(sink.path(), tmp.path().join("nested").join("access.log"));

        writeln!(sink.open().unwrap(), "first").unwrap();
        writeln!(sink.open().unwrap(), "second").unwrap();

        let contents = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_unwritable_sink_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"").unwrap();
        // A regular file cannot act as the log directory.
        let sink = LogSinkConfig::new(&blocker, "x");

        let err = sink.open().unwrap_err();
        assert!(matches!(err, TelemetryError::LogSink { .. }));
    }
}
