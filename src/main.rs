//! hostlb - interactive driver for the load balancing core
//!
//! Usage:
//!     hostlb [--config <path>]
//!
//! Reads commands from stdin, one per line:
//!     +addr -addr ...   apply a discovery batch
//!     select            pick a host
//!     ok <addr>         report a successful request
//!     fail <addr>       report a failed request
//!     open <addr>       report a connection opened
//!     close <addr>      report a connection closed
//!     hosts             list hosts
//!     metrics           print metrics
//!     quit              exit
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use hostlb::config::{load_config, validate_config, Config};
use hostlb::executor::TokioExecutor;
use hostlb::health::TcpProbe;
use hostlb::metrics::{MetricsCollector, MetricsObserver};
use hostlb::observer::{LoadBalancerObserver, LoggingObserver, MultiObserver};
use hostlb::util::init_logging;
use hostlb::{DiscoveryEvent, LoadBalancerCore, Outcome};

/// Client-side load balancing core with an interactive stdin driver.
#[derive(Parser, Debug)]
#[command(name = "hostlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

/// One line of driver input.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Discovery(Vec<DiscoveryEvent<SocketAddr>>),
    Select,
    Success(SocketAddr),
    Failure(SocketAddr),
    Open(SocketAddr),
    Close(SocketAddr),
    Hosts,
    Metrics,
    Quit,
}

fn parse_address(arg: Option<&str>) -> Result<SocketAddr, String> {
    let arg = arg.ok_or_else(|| "missing address".to_string())?;
    arg.parse()
        .map_err(|e| format!("invalid address '{}': {}", arg, e))
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };

    let command = match first {
        "select" => Command::Select,
        "ok" => Command::Success(parse_address(words.next())?),
        "fail" => Command::Failure(parse_address(words.next())?),
        "open" => Command::Open(parse_address(words.next())?),
        "close" => Command::Close(parse_address(words.next())?),
        "hosts" => Command::Hosts,
        "metrics" => Command::Metrics,
        "quit" | "exit" => Command::Quit,
        _ if first.starts_with(['+', '-']) => {
            let mut events = Vec::new();
            for word in std::iter::once(first).chain(words) {
                let event = if let Some(address) = word.strip_prefix('+') {
                    DiscoveryEvent::available(parse_address(Some(address))?)
                } else if let Some(address) = word.strip_prefix('-') {
                    DiscoveryEvent::unavailable(parse_address(Some(address))?)
                } else {
                    return Err(format!("expected +addr or -addr, got '{}'", word));
                };
                events.push(event);
            }
            Command::Discovery(events)
        }
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(command))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration, falling back to defaults without a file
    let config = match &cli.config {
        Some(path) => load_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => {
            let config = Config::default();
            validate_config(&config)
                .map_err(|e| anyhow::anyhow!("default configuration is invalid: {}", e))?;
            config
        }
    };

    // Determine log level (CLI overrides config)
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    // Initialize logging
    init_logging(log_level, &config.global.log_format).context("failed to initialize logging")?;

    // If --validate flag, just validate and exit
    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!(
            "  Load balancer: {} ({:?}, fail_open={})",
            config.load_balancer.description,
            config.load_balancer.algorithm,
            config.load_balancer.fail_open
        );
        println!(
            "  Health: unhealthy after {} failures, probe every {:?} + up to {:?}",
            config.health.unhealthy_threshold,
            config.health.probe_interval,
            config.health.probe_jitter
        );
        return Ok(());
    }

    run(config)
}

/// Run the driver with the given configuration.
fn run(config: Config) -> Result<()> {
    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the driver.
async fn run_async(config: Config) -> Result<()> {
    let collector = MetricsCollector::new();
    let description = config.load_balancer.description.clone();
    let observers: Vec<Arc<dyn LoadBalancerObserver<SocketAddr>>> = vec![
        Arc::new(LoggingObserver::new(description.clone())),
        Arc::new(MetricsObserver::new(description, collector.clone())),
    ];

    let lb = LoadBalancerCore::<SocketAddr>::builder(
        Arc::new(TcpProbe::new(config.health.probe_timeout)),
        Arc::new(TokioExecutor::current()),
    )
    .config(&config)
    .observer(Arc::new(MultiObserver::new(observers)))
    .build();

    info!(lb = %lb.description(), "hostlb is running");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("received shutdown signal"),
                    Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
                }
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(&lb, &collector, command),
            Ok(None) => {}
            Err(e) => {
                warn!(input = %line, error = %e, "rejected command");
                println!("error: {}", e);
            }
        }
    }

    lb.close();
    info!("hostlb shut down complete");
    Ok(())
}

fn execute(lb: &LoadBalancerCore<SocketAddr>, collector: &MetricsCollector, command: Command) {
    match command {
        Command::Discovery(events) => match lb.on_discovery_events(&events) {
            Some(changes) => println!(
                "applied: {} added, {} removed",
                changes.added.len(),
                changes.removed.len()
            ),
            None => println!("error: load balancer is closed"),
        },
        Command::Select => match lb.select() {
            Ok(host) => println!("{}", host.address()),
            Err(e) => println!("error: {}", e),
        },
        Command::Success(address) => lb.report_outcome(&address, Outcome::Success),
        Command::Failure(address) => lb.report_outcome(&address, Outcome::Failure(None)),
        Command::Open(address) => {
            if !lb.report_connection_opened(&address) {
                println!("error: {} is not accepting connections", address);
            }
        }
        Command::Close(address) => lb.report_connection_closed(&address),
        Command::Hosts => {
            for host in lb.hosts() {
                println!("{}", host);
            }
        }
        Command::Metrics => match collector.encode() {
            Ok(text) => print!("{}", text),
            Err(e) => println!("error: failed to encode metrics: {}", e),
        },
        Command::Quit => {}
    }
}
