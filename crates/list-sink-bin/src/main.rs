//! list-sink binary entry point.
//!
//! Usage: list-sink [--config <file>] [--host <host>] [--port <port>] [--key <list>]...
//!
//! Reads newline-separated records from stdin and appends each one to the
//! configured Redis lists. Stops on EOF, SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use list_sink_appender::{LayoutKind, ListAppender, LogRecord};
use list_sink_core::SinkConfig;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Ship newline-separated log records from stdin to Redis lists.
#[derive(Parser, Debug)]
#[command(name = "list-sink")]
#[command(about = "Ship newline-separated log records from stdin to Redis lists")]
#[command(version)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "LIST_SINK_CONFIG")]
    config: Option<PathBuf>,

    /// Redis host, overrides the configuration file.
    #[arg(long)]
    host: Option<String>,

    /// Redis port, overrides the configuration file.
    #[arg(long)]
    port: Option<u16>,

    /// Destination list. Repeat to write every record to several lists.
    #[arg(long = "key")]
    keys: Vec<String>,

    /// How each line is laid out (raw, json, text).
    #[arg(long, default_value = "raw")]
    layout: LayoutKind,

    /// Lines sent per round trip; 1 sends each line on its own.
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Seconds to wait for in-flight sends when stopping.
    #[arg(long, default_value_t = 5)]
    shutdown_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},r2d2=warn", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();
}

fn load_config(args: &Args) -> Result<SinkConfig> {
    let mut config = SinkConfig::load(args.config.as_deref()).context("loading configuration")?;

    if let Some(host) = &args.host {
        config.endpoint.host = host.clone();
    }
    if let Some(port) = args.port {
        config.endpoint.port = port;
    }
    if !args.keys.is_empty() {
        config.keys = args.keys.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Stop the appender and exit on SIGINT or SIGTERM.
fn spawn_signal_handler(appender: Arc<ListAppender>, timeout: Duration) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("registering signal handlers")?;

    std::thread::Builder::new()
        .name("list-sink-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal = signal, "Received signal, stopping");
                let drained = appender.stop(timeout);
                std::process::exit(if drained { 0 } else { 1 });
            }
        })
        .context("spawning signal thread")?;

    Ok(())
}

#[derive(Debug, Default)]
struct Totals {
    delivered: usize,
    failed: usize,
}

fn flush(appender: &ListAppender, batch: &mut Vec<LogRecord>, totals: &mut Totals) {
    if batch.is_empty() {
        return;
    }
    if let Some(report) = appender.append_batch(batch.drain(..)) {
        totals.delivered += report.delivered;
        totals.failed += report.failed + report.abandoned;
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config = load_config(&args)?;
    let timeout = Duration::from_secs(args.shutdown_timeout_secs);
    let layout = args.layout.build(&config.name);

    let appender = Arc::new(ListAppender::redis(config, layout).context("creating appender")?);
    appender.start().context("starting appender")?;
    info!(appender = %appender, layout = %args.layout, batch_size = args.batch_size, "list-sink started");

    spawn_signal_handler(Arc::clone(&appender), timeout)?;

    let mut totals = Totals::default();
    let mut batch = Vec::with_capacity(args.batch_size.max(1));

    for line in std::io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.is_empty() {
            continue;
        }
        let record = LogRecord::new(Level::INFO, "stdin", line);

        if args.batch_size <= 1 {
            match appender.append(&record) {
                Some(delivery) if delivery.is_delivered() => totals.delivered += 1,
                _ => totals.failed += 1,
            }
        } else {
            batch.push(record);
            if batch.len() >= args.batch_size {
                flush(&appender, &mut batch, &mut totals);
            }
        }
    }
    flush(&appender, &mut batch, &mut totals);

    let drained = appender.stop(timeout);
    if !drained {
        warn!("Connections still in use at shutdown");
    }
    info!(
        delivered = totals.delivered,
        failed = totals.failed,
        "list-sink stopped"
    );

    Ok(())
}
