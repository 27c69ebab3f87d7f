//! mysqlmon - MySQL metrics collector.
//!
//! Discovers local MySQL servers, collects their status once (or every
//! `--interval` seconds) and prints one metric per line on stdout.
//! Diagnostics go to stderr.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use mysqlmon::collector::{
    Collector, Connector, Credentials, ExitStatus, FileSystem, MysqlConnector, RealFs,
    StaticCredentials,
};
use mysqlmon::config::{
    CollectorConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_METRIC_PREFIX, DEFAULT_REFRESH_INTERVAL,
    DEFAULT_SEARCH_DIRS, StaticEndpoint,
};
use mysqlmon::sink::MetricWriter;

/// MySQL metrics collector.
#[derive(Parser, Debug)]
#[command(name = "mysqlmon", about = "MySQL metrics collector", version)]
struct Args {
    /// Collection interval in seconds. 0 runs a single cycle and exits.
    #[arg(short, long, default_value = "0")]
    interval: u64,

    /// Extra socket file to monitor under the name "default" (repeatable).
    #[arg(long = "socket", value_name = "PATH")]
    sockets: Vec<PathBuf>,

    /// Directory scanned for mysql-<name>/<file>.sock (repeatable).
    /// Replaces the default /var/lib/mysql when given.
    #[arg(long = "search-dir", value_name = "DIR")]
    search_dirs: Vec<PathBuf>,

    /// Static TCP endpoint as NAME=HOST[:PORT] (repeatable).
    #[arg(long = "endpoint", value_name = "NAME=HOST:PORT", value_parser = StaticEndpoint::parse)]
    endpoints: Vec<StaticEndpoint>,

    /// Seconds between endpoint discovery passes.
    #[arg(long, default_value_t = DEFAULT_REFRESH_INTERVAL.as_secs())]
    refresh_interval: u64,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    connect_timeout: u64,

    /// Socket read/write timeout in seconds. Defaults to the connect timeout.
    #[arg(long, value_name = "SECS")]
    query_timeout: Option<u64>,

    /// Collect per-mutex OS waits (expensive on busy servers).
    #[arg(long)]
    innodb_mutex: bool,

    /// Metric name prefix.
    #[arg(long, default_value = DEFAULT_METRIC_PREFIX)]
    prefix: String,

    /// User to connect as.
    #[arg(short, long, env = "MYSQL_USER", default_value = "root")]
    user: String,

    /// Password to connect with.
    #[arg(short, long, env = "MYSQL_PWD", default_value = "mysql", hide_env_values = true)]
    password: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Builds the collector configuration, rejecting values the collector
    /// can't work with.
    fn collector_config(&self) -> Result<CollectorConfig, String> {
        if self.connect_timeout == 0 {
            return Err("--connect-timeout must be at least 1 second".to_string());
        }
        if self.query_timeout == Some(0) {
            return Err("--query-timeout must be at least 1 second".to_string());
        }
        if self.prefix.chars().any(char::is_whitespace) {
            return Err(format!("--prefix '{}' must not contain whitespace", self.prefix));
        }

        let search_dirs = if self.search_dirs.is_empty() {
            DEFAULT_SEARCH_DIRS.iter().map(PathBuf::from).collect()
        } else {
            self.search_dirs.clone()
        };

        Ok(CollectorConfig::default()
            .with_extra_sockets(self.sockets.iter().cloned())
            .with_search_dirs(search_dirs)
            .with_static_endpoints(self.endpoints.clone())
            .with_refresh_interval(Duration::from_secs(self.refresh_interval))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_query_timeout(self.query_timeout.map(Duration::from_secs))
            .with_innodb_mutex(self.innodb_mutex)
            .with_metric_prefix(self.prefix.clone()))
    }
}

/// Parses arguments. Usage errors exit with the misconfiguration code so
/// they can't be mistaken for a broken pipe.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(ExitStatus::Misconfigured.code());
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
/// Logs go to stderr; stdout carries metrics only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("mysqlmon={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let args = parse_args();
    init_logging(args.verbose, args.quiet);

    let status = run(&args);
    debug!("exiting with {:?}", status);
    std::process::exit(status.code());
}

fn run(args: &Args) -> ExitStatus {
    let config = match args.collector_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitStatus::Misconfigured;
        }
    };

    info!("mysqlmon {} starting", env!("CARGO_PKG_VERSION"));
    debug!(
        "Config: interval={}s, refresh={:?}, connect_timeout={:?}, query_timeout={:?}, innodb_mutex={}",
        args.interval,
        config.refresh_interval,
        config.connect_timeout,
        config.query_timeout,
        config.collect_innodb_mutex
    );

    let credentials = Arc::new(StaticCredentials(Credentials::new(
        args.user.clone(),
        args.password.clone(),
    )));
    let connector = MysqlConnector::new(credentials, config.connect_timeout)
        .with_query_timeout(config.query_timeout);
    let prefix = config.metric_prefix.clone();
    let mut collector = Collector::new(RealFs::new(), connector, config);

    if collector.nothing_to_monitor() {
        print_nothing_to_monitor(collector.config());
        return ExitStatus::NothingToMonitor;
    }

    let stdout = io::stdout();
    let mut sink = MetricWriter::new(stdout.lock(), prefix);

    if args.interval == 0 {
        let status = run_cycle(&mut collector, &mut sink);
        collector.shutdown();
        return status.unwrap_or(ExitStatus::Success);
    }

    let interval = Duration::from_secs(args.interval);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut status = ExitStatus::Success;
    while running.load(Ordering::SeqCst) {
        if let Some(fatal) = run_cycle(&mut collector, &mut sink) {
            status = fatal;
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down...");
    collector.shutdown();
    status
}

/// Runs one cycle. Returns the exit status if collection must stop.
fn run_cycle<F, C, W>(
    collector: &mut Collector<F, C>,
    sink: &mut MetricWriter<W>,
) -> Option<ExitStatus>
where
    F: FileSystem,
    C: Connector + Clone,
    W: Write,
{
    match collector.collect_cycle(sink) {
        Ok(report) => {
            if !report.failed.is_empty() {
                warn!("dropped endpoints: {}", report.failed.join(", "));
            }
            debug!(
                "{} endpoints, {} observations in {:?}",
                report.collected, report.observations, report.duration
            );
            None
        }
        Err(e) if e.is_broken_pipe() => {
            debug!("metric consumer went away: {}", e);
            Some(ExitStatus::BrokenPipe)
        }
        Err(e) => {
            error!("collection failed: {}", e);
            None
        }
    }
}

/// Prints where servers were looked for, so an empty host is easy to tell
/// apart from a misconfigured one.
fn print_nothing_to_monitor(config: &CollectorConfig) {
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    eprintln!("{YELLOW}No MySQL server to monitor.");
    eprintln!();
    eprintln!("  Looked for sockets in:");
    for dir in &config.search_dirs {
        eprintln!("    {}/mysql-<name>/<file>.sock", dir.display());
    }
    for socket in &config.default_sockets {
        eprintln!("    {}", socket.display());
    }
    eprintln!();
    eprintln!("  Add servers with --socket PATH or --endpoint NAME=HOST:PORT.{RESET}");
}
