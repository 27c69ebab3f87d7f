//! Endpoint discovery and tracking.
//!
//! Servers are found by looking for socket files: first one level below each
//! search directory (`<dir>/mysql-<name>/<file>.sock`), then at the
//! well-known default locations. Each socket is mapped to a logical name that
//! becomes the `schema` tag of everything collected from it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::collector::mysql_collector::{Connector, Session};
use crate::collector::traits::FileSystem;
use crate::config::CollectorConfig;

/// Logical name for sockets at the well-known default locations.
pub const DEFAULT_ENDPOINT_NAME: &str = "default";

/// `/…/mysql-<name>/<file>.sock`. Names are tag values on the wire, so
/// they can't contain whitespace.
static SOCKET_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/mysql-([^/\s]+)/[^./]+\.sock$").expect("valid regex"));

/// Where to reach a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    Socket(PathBuf),
    Tcp { host: String, port: u16 },
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Socket(path) => write!(f, "{}", path.display()),
            Address::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// One monitorable server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: Address,
    /// Logical name, unique among tracked endpoints.
    pub name: String,
    /// Cleared when opening a session fails or a tracked session is dropped;
    /// set again once a session opens.
    pub reachable: bool,
}

impl Endpoint {
    pub fn new(address: Address, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            reachable: true,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Maps a socket path to its logical name.
///
/// Default locations map to [`DEFAULT_ENDPOINT_NAME`]; other sockets must
/// live in a `mysql-<name>` directory. Returns `None` otherwise.
pub fn endpoint_name(socket: &Path, default_sockets: &[PathBuf]) -> Option<String> {
    if default_sockets.iter().any(|p| p == socket) {
        return Some(DEFAULT_ENDPOINT_NAME.to_string());
    }
    let path = socket.to_str()?;
    SOCKET_NAME_RE
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Discovers endpoints and keeps the tracked session map up to date.
pub struct EndpointRegistry<F: FileSystem> {
    fs: F,
    config: CollectorConfig,
    last_refresh: Option<Instant>,
    /// Endpoints seen by the last refresh, by name.
    known: BTreeMap<String, Endpoint>,
}

impl<F: FileSystem> EndpointRegistry<F> {
    pub fn new(fs: F, config: CollectorConfig) -> Self {
        Self {
            fs,
            config,
            last_refresh: None,
            known: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Returns candidate socket paths in discovery order.
    ///
    /// Only the first socket of each search sub-directory is taken: one
    /// server per directory is expected.
    pub fn find_sockets(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        for dir in &self.config.search_dirs {
            if !self.fs.is_dir(dir) {
                continue;
            }
            let subdirs = match self.fs.read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("couldn't list {}: {}", dir.display(), e);
                    continue;
                }
            };
            for subdir in subdirs {
                if !self.fs.is_dir(&subdir) {
                    continue;
                }
                let entries = match self.fs.read_dir(&subdir) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!("couldn't list {}: {}", subdir.display(), e);
                        continue;
                    }
                };
                if let Some(socket) = entries.into_iter().find(|p| self.fs.is_socket(p)) {
                    paths.push(socket);
                }
            }
        }

        for socket in &self.config.default_sockets {
            if self.fs.is_socket(socket) {
                paths.push(socket.clone());
            }
        }

        paths
    }

    /// Returns every endpoint worth monitoring, deduplicated by name.
    ///
    /// Sockets that can't be named are skipped with a warning. Static TCP
    /// endpoints are appended under their configured names.
    pub fn discover(&self) -> Vec<Endpoint> {
        let mut endpoints: Vec<Endpoint> = Vec::new();

        for socket in self.find_sockets() {
            let Some(name) = endpoint_name(&socket, &self.config.default_sockets) else {
                warn!("couldn't guess the name of the server for {}", socket.display());
                continue;
            };
            if endpoints.iter().any(|e| e.name == name) {
                debug!("{} already discovered as {}", socket.display(), name);
                continue;
            }
            endpoints.push(Endpoint::new(Address::Socket(socket), name));
        }

        for ep in &self.config.static_endpoints {
            if endpoints.iter().any(|e| e.name == ep.name) {
                warn!("static endpoint {} shadowed by a discovered socket", ep);
                continue;
            }
            endpoints.push(Endpoint::new(
                Address::Tcp {
                    host: ep.host.clone(),
                    port: ep.port,
                },
                ep.name.clone(),
            ));
        }

        endpoints
    }

    /// Returns `true` when there is nothing at all to monitor.
    pub fn is_empty(&self) -> bool {
        self.config.static_endpoints.is_empty() && self.find_sockets().is_empty()
    }

    /// Endpoints seen by the last refresh, in name order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.known.values()
    }

    /// Records that the session for `name` failed and was dropped.
    pub fn mark_unreachable(&mut self, name: &str) {
        if let Some(endpoint) = self.known.get_mut(name) {
            endpoint.reachable = false;
        }
    }

    /// Returns `true` if the refresh interval has elapsed (or never ran).
    pub fn refresh_due(&self) -> bool {
        match self.last_refresh {
            None => true,
            Some(t) => t.elapsed() >= self.config.refresh_interval,
        }
    }

    /// Opens sessions for newly discovered endpoints.
    ///
    /// Already tracked names are left untouched. Endpoints whose connection
    /// or version probe fails are marked unreachable and retried on the next
    /// refresh; the warning is logged only when an endpoint becomes
    /// unreachable. Returns the number of sessions added.
    pub fn refresh<C: Connector + Clone>(
        &mut self,
        sessions: &mut BTreeMap<String, Session<C>>,
        connector: &C,
    ) -> usize {
        self.last_refresh = Some(Instant::now());
        let discovered = self.discover();
        self.known
            .retain(|name, _| discovered.iter().any(|e| &e.name == name));
        let mut added = 0;

        for mut endpoint in discovered {
            if sessions.contains_key(&endpoint.name) {
                self.known.insert(endpoint.name.clone(), endpoint);
                continue;
            }
            let was_reachable = self
                .known
                .get(&endpoint.name)
                .is_none_or(|known| known.reachable);

            match Session::open(endpoint.clone(), connector.clone()) {
                Ok(session) => {
                    info!(
                        "tracking {} (version {})",
                        endpoint,
                        session.version_string()
                    );
                    sessions.insert(endpoint.name.clone(), session);
                    added += 1;
                }
                Err(e) => {
                    if was_reachable {
                        warn!("couldn't connect to {}: {}", endpoint, e);
                    } else {
                        debug!("{} still unreachable: {}", endpoint, e);
                    }
                    endpoint.reachable = false;
                }
            }
            self.known.insert(endpoint.name.clone(), endpoint);
        }

        added
    }
}
