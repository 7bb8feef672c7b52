use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use clap::{
    Args as ClapArgs, Parser, Subcommand,
    builder::{Styles, styling::AnsiColor},
};
use color_eyre::eyre::{Result, eyre};
use traced_http::{
    CallOptions, ClientFactory, ErrorPolicy, RequestExecutor, RequestOutcome,
    TracingLogger, probe,
};
use traced_http_telemetry::{LogSinkConfig, TelemetryConfig};
use tracing::info;

const SYSLOG_IDENTIFIER: &str = "traced-http";

#[derive(Debug, Parser)]
#[command(version, about, styles = clap_v3_styles())]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Also append log lines to a file in this directory.
    #[arg(long, env = "TRACED_HTTP_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// File name (without extension) of the log file.
    #[arg(
        long,
        env = "TRACED_HTTP_LOG_NAME",
        default_value = "traced-http",
        global = true
    )]
    log_name: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a GET request.
    Get(RequestArgs),
    /// Send a POST request.
    Post {
        #[command(flatten)]
        request: RequestArgs,
        /// Request header as `Name: value`. Can be repeated.
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// Raw request body.
        #[arg(short, long, default_value = "")]
        data: String,
    },
    /// Check that a TCP connection to `host:port` can be opened.
    Probe {
        addr: String,
        /// Connect timeout in seconds.
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
}

#[derive(Debug, ClapArgs)]
struct RequestArgs {
    url: String,
    /// Overall request timeout in seconds, 0 disables it.
    #[arg(long, env = "TRACED_HTTP_TIMEOUT", default_value = "10")]
    timeout: u64,
    /// Report transport failures for GET too.
    #[arg(long, env = "TRACED_HTTP_STRICT")]
    strict: bool,
    /// Keep the connection open for reuse instead of closing it.
    #[arg(long)]
    keep_open: bool,
}

impl RequestArgs {
    fn executor(&self) -> RequestExecutor {
        let policy = if self.strict {
            ErrorPolicy::Strict
        } else {
            ErrorPolicy::Lenient
        };
        RequestExecutor::new(ClientFactory::new(), Arc::new(TracingLogger))
            .with_policy(policy)
    }

    fn call(&self) -> CallOptions {
        let call = CallOptions::new(self.timeout);
        if self.keep_open { call.keep_open() } else { call }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in {raw:?}"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn clap_v3_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::new().with_journald(SYSLOG_IDENTIFIER);
    if let Some(dir) = &args.log_dir {
        telemetry = telemetry.with_file_sink(LogSinkConfig::new(dir, &args.log_name));
    }
    let telemetry = telemetry.try_init()?;

    let result = run(args).await;

    telemetry.flush();
    result
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Get(request) => {
            let outcome = request
                .executor()
                .get_with(&request.url, request.call())
                .await;
            report(outcome)
        }
        Command::Post {
            request,
            headers,
            data,
        } => {
            let headers: HashMap<String, String> = headers.into_iter().collect();
            let outcome = request
                .executor()
                .post_with(&request.url, &headers, data, request.call())
                .await;
            report(outcome)
        }
        Command::Probe { addr, timeout } => {
            probe::dial(&addr, Duration::from_secs(timeout)).await?;
            info!(%addr, "reachable");
            println!("{addr} is reachable");
            Ok(())
        }
    }
}

fn report(outcome: RequestOutcome) -> Result<()> {
    println!("{}", String::from_utf8_lossy(&outcome.body));
    println!(
        "elapsed: {} s ({} ms)",
        outcome.elapsed_seconds, outcome.elapsed_millis
    );
    match outcome.error {
        Some(err) => Err(eyre!(err).wrap_err("request failed")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parsing() {
        assert_eq!(
            parse_header("X-Test: a:b ").unwrap(),
            ("X-Test".to_owned(), "a:b".to_owned())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_post_args() {
        let args = Args::try_parse_from([
            "traced-http",
            "post",
            "http://localhost:8080/echo",
            "-H",
            "X-Test: a",
            "--data",
            "ping",
            "--keep-open",
        ])
        .unwrap();
        let Command::Post {
            request,
            headers,
            data,
        } = args.command
        else {
            panic!("expected post");
        };
        assert_eq!(headers, vec![("X-Test".to_owned(), "a".to_owned())]);
        assert_eq!(data, "ping");
        assert!(!request.call().close_after_use);
    }
}
