//! Collector configuration.
//!
//! Everything the registry and the sessions need to know about where to look
//! and how long to wait lives here. The binary fills it from command-line
//! arguments; library users can start from [`CollectorConfig::default`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known default socket files.
pub const DEFAULT_SOCKETS: &[&str] = &[
    "/tmp/mysql.sock",             // MySQL's own default
    "/var/lib/mysql/mysql.sock",   // RPM-based systems
    "/var/run/mysqld/mysqld.sock", // Debian-based systems
];

/// Directories whose sub-directories are scanned for extra socket files.
pub const DEFAULT_SEARCH_DIRS: &[&str] = &["/var/lib/mysql"];

/// How often the registry looks for new servers.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Connect timeout used when opening a session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Namespace prepended to every metric name on output.
pub const DEFAULT_METRIC_PREFIX: &str = "mysql";

/// A statically configured TCP endpoint (`NAME=HOST:PORT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl StaticEndpoint {
    /// Parses `NAME=HOST:PORT`. The port defaults to 3306 when omitted.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (name, target) = s
            .split_once('=')
            .ok_or_else(|| format!("invalid endpoint '{}': expected NAME=HOST:PORT", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("invalid endpoint '{}': empty name", s));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(format!("invalid endpoint '{}': name contains whitespace", s));
        }

        let target = target.trim();
        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| format!("invalid port in '{}': {}", s, e))?;
                (host, port)
            }
            None => (target, 3306),
        };
        if host.is_empty() {
            return Err(format!("invalid endpoint '{}': empty host", s));
        }

        Ok(Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for StaticEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.name, self.host, self.port)
    }
}

/// Immutable configuration shared by the registry, sessions and cycle driver.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Socket files that map to the logical name `default`.
    pub default_sockets: Vec<PathBuf>,
    /// Directories scanned one level deep for `mysql-<name>/<file>.sock`.
    pub search_dirs: Vec<PathBuf>,
    /// TCP endpoints registered regardless of discovery.
    pub static_endpoints: Vec<StaticEndpoint>,
    pub refresh_interval: Duration,
    pub connect_timeout: Duration,
    /// Per-query read/write timeout. `None` leaves queries unbounded.
    pub query_timeout: Option<Duration>,
    /// Collect `SHOW ENGINE INNODB MUTEX`. Expensive on busy servers.
    pub collect_innodb_mutex: bool,
    pub metric_prefix: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            default_sockets: DEFAULT_SOCKETS.iter().map(PathBuf::from).collect(),
            search_dirs: DEFAULT_SEARCH_DIRS.iter().map(PathBuf::from).collect(),
            static_endpoints: Vec::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: None,
            collect_innodb_mutex: false,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
        }
    }
}

impl CollectorConfig {
    /// Adds default socket locations on top of the built-in set.
    pub fn with_extra_sockets(mut self, sockets: impl IntoIterator<Item = PathBuf>) -> Self {
        for socket in sockets {
            if !self.default_sockets.contains(&socket) {
                self.default_sockets.push(socket);
            }
        }
        self
    }

    /// Replaces the search directories.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn with_static_endpoints(mut self, endpoints: Vec<StaticEndpoint>) -> Self {
        self.static_endpoints = endpoints;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_innodb_mutex(mut self, enabled: bool) -> Self {
        self.collect_innodb_mutex = enabled;
        self
    }

    pub fn with_metric_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_prefix = prefix.into();
        self
    }
}
