use std::fmt;

/// Severity of a [`Logger`] line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "info",
            Level::Error => "error",
        })
    }
}

/// Sink for the lines emitted by [`crate::RequestExecutor`].
///
/// Formatting, persistence and rotation are up to the implementation.
pub trait Logger: Send + Sync {
    fn write(&self, level: Level, message: &str);
}

/// Forwards every line to [`tracing`], under the `traced_http` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn write(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(target: "traced_http", "{message}"),
            Level::Error => tracing::error!(target: "traced_http", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(Level::Info.to_string(), "info");
        assert_eq!(Level::Error.to_string(), "error");
    }

    #[test_log::test]
    fn test_tracing_logger_accepts_both_levels() {
        let logger: &dyn Logger = &TracingLogger;
        logger.write(Level::Info, "hello");
        logger.write(Level::Error, "boom");
    }
}
