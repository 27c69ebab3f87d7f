//! Scripted in-memory database server for testing sessions and cycles.
//!
//! Servers are keyed by the display form of their [`Address`]: the socket
//! path, or `host:port`. Every server answers `SELECT VERSION()` from its
//! configured version string, returns registered result sets for other
//! statements and an empty result for anything unknown. Failures can be
//! queued per statement.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::collector::mysql_collector::{
    Connection, Connector, DriverError, ResultSet, SqlValue, VERSION_QUERY,
};
use crate::collector::registry::Address;

#[derive(Debug, Default)]
struct MockServer {
    version: String,
    responses: HashMap<String, ResultSet>,
    failures: HashMap<String, VecDeque<DriverError>>,
    refuse: bool,
}

#[derive(Debug, Default)]
struct MockState {
    servers: HashMap<String, MockServer>,
    connects: usize,
    open: usize,
    /// `(address, sql)` in execution order.
    queries: Vec<(String, String)>,
}

/// [`Connector`] over scripted servers. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a server that reports `version`.
    pub fn add_server(&self, address: &str, version: &str) {
        let mut state = self.state();
        let server = state.servers.entry(address.to_string()).or_default();
        server.version = version.to_string();
        server.refuse = false;
    }

    /// Makes every new connection to `address` fail.
    pub fn refuse_connections(&self, address: &str) {
        self.state()
            .servers
            .entry(address.to_string())
            .or_default()
            .refuse = true;
    }

    /// Accepts connections to `address` again.
    pub fn accept_connections(&self, address: &str) {
        if let Some(server) = self.state().servers.get_mut(address) {
            server.refuse = false;
        }
    }

    /// Sets the result returned for `sql`.
    pub fn set_response(&self, address: &str, sql: &str, rs: ResultSet) {
        self.state()
            .servers
            .entry(address.to_string())
            .or_default()
            .responses
            .insert(sql.to_string(), rs);
    }

    /// Queues an error for the next execution of `sql`.
    pub fn fail_next(&self, address: &str, sql: &str, err: DriverError) {
        self.state()
            .servers
            .entry(address.to_string())
            .or_default()
            .failures
            .entry(sql.to_string())
            .or_default()
            .push_back(err);
    }

    /// Number of successful connects so far.
    pub fn connects(&self) -> usize {
        self.state().connects
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.state().open
    }

    /// Statements executed against `address`, oldest first.
    pub fn queries(&self, address: &str) -> Vec<String> {
        self.state()
            .queries
            .iter()
            .filter(|(addr, _)| addr == address)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&self, address: &Address) -> Result<MockConnection, DriverError> {
        let key = address.to_string();
        let mut state = self.state();
        match state.servers.get(&key) {
            Some(server) if !server.refuse => {}
            _ => return Err(DriverError::other(format!("can't connect to {}", key))),
        }
        state.connects += 1;
        state.open += 1;
        Ok(MockConnection {
            address: key,
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    address: String,
    state: Arc<Mutex<MockState>>,
}

impl Connection for MockConnection {
    fn query(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queries.push((self.address.clone(), sql.to_string()));

        let Some(server) = state.servers.get_mut(&self.address) else {
            return Err(DriverError::severed("server has gone away"));
        };
        if let Some(err) = server.failures.get_mut(sql).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if sql == VERSION_QUERY {
            return Ok(ResultSet::new(
                vec!["VERSION()".to_string()],
                vec![vec![SqlValue::from(server.version.as_str())]],
            ));
        }
        Ok(server.responses.get(sql).cloned().unwrap_or_default())
    }

    fn close(self) {}
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.open = state.open.saturating_sub(1);
    }
}
