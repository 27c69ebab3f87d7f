//! One live connection to one endpoint.

use std::fmt;

use tracing::{debug, warn};

use super::CollectError;
use super::driver::{Connection, Connector, DriverError, ResultSet};
use super::queries::VERSION_QUERY;
use crate::collector::registry::Endpoint;

/// Server version as reported by `SELECT VERSION()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    /// The server identifies itself as MariaDB.
    pub mariadb: bool,
}

impl ServerVersion {
    /// Parses strings like `5.1.73-log`, `8.0.36` or `10.6.12-MariaDB-1:10.6.12+maria`.
    ///
    /// Anything without a leading `<major>.<minor>` yields `(0, 0)`.
    pub fn parse(version: &str) -> Self {
        let mariadb = version.to_ascii_lowercase().contains("mariadb");
        let mut parts = version.trim().split('.');
        let major = parts.next().and_then(|s| s.parse::<u32>().ok());
        let minor = parts.next().and_then(|s| {
            let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        });

        match (major, minor) {
            (Some(major), Some(minor)) => Self {
                major,
                minor,
                mariadb,
            },
            _ => Self {
                major: 0,
                minor: 0,
                mariadb,
            },
        }
    }

    /// `SHOW GLOBAL STATUS` locks pre-5.1 servers for too long to be safe.
    pub fn supports_global_status_snapshot(&self) -> bool {
        (self.major, self.minor) >= (5, 1)
    }

    /// MySQL 8.1+ removed the `SLAVE` spelling of the replication commands.
    pub fn uses_replica_status(&self) -> bool {
        !self.mariadb && (self.major, self.minor) >= (8, 1)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Owns the connection to one endpoint.
///
/// Queries on a closed session reconnect first. A query that fails because
/// the connection was severed is retried once on a fresh connection.
pub struct Session<C: Connector> {
    endpoint: Endpoint,
    connector: C,
    conn: Option<C::Conn>,
    version_string: String,
    version: ServerVersion,
    /// Replication state cached from the last replication poll.
    pub(crate) master_host: Option<String>,
    pub(crate) slave_bytes_executed: Option<u64>,
    pub(crate) relay_bytes_relayed: Option<u64>,
}

impl<C: Connector> Session<C> {
    /// Connects and probes the server version.
    pub fn open(endpoint: Endpoint, connector: C) -> Result<Self, CollectError> {
        let mut conn = connector
            .connect(&endpoint.address)
            .map_err(|e| CollectError::Connection(format!("{}: {}", endpoint.address, e)))?;

        let version_string = match probe_version(&mut conn) {
            Ok(v) => v,
            Err(e) => {
                conn.close();
                return Err(CollectError::Connection(format!(
                    "{}: version probe failed: {}",
                    endpoint.address, e
                )));
            }
        };
        let version = ServerVersion::parse(&version_string);
        debug!("{}: server version {:?} -> {}", endpoint, version_string, version);

        Ok(Self {
            endpoint,
            connector,
            conn: Some(conn),
            version_string,
            version,
            master_host: None,
            slave_bytes_executed: None,
            relay_bytes_relayed: None,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Logical name of the endpoint (the `schema` tag).
    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    pub fn version_string(&self) -> &str {
        &self.version_string
    }

    pub fn supports_global_status_snapshot(&self) -> bool {
        self.version.supports_global_status_snapshot()
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn master_host(&self) -> Option<&str> {
        self.master_host.as_deref()
    }

    pub fn slave_bytes_executed(&self) -> Option<u64> {
        self.slave_bytes_executed
    }

    pub fn relay_bytes_relayed(&self) -> Option<u64> {
        self.relay_bytes_relayed
    }

    /// Executes `sql` and returns every row.
    pub fn query(&mut self, sql: &str) -> Result<ResultSet, CollectError> {
        if self.conn.is_none() {
            debug!("{}: session closed, reconnecting", self.endpoint);
            self.reconnect()?;
        }

        match self.execute(sql) {
            Ok(rs) => Ok(rs),
            Err(e) if e.is_severed() => {
                warn!("{}: {}, reconnecting", self.endpoint, e);
                self.reconnect()?;
                self.execute(sql).map_err(|e| {
                    if e.is_severed() {
                        self.close();
                        CollectError::Connection(format!("{}: {}", self.endpoint.address, e))
                    } else {
                        CollectError::Query(e.to_string())
                    }
                })
            }
            Err(e) => Err(CollectError::Query(e.to_string())),
        }
    }

    /// Releases the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
            debug!("{}: connection closed", self.endpoint);
        }
    }

    fn execute(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        match self.conn.as_mut() {
            Some(conn) => conn.query(sql),
            None => Err(DriverError::severed("session closed")),
        }
    }

    fn reconnect(&mut self) -> Result<(), CollectError> {
        self.close();
        let conn = self
            .connector
            .connect(&self.endpoint.address)
            .map_err(|e| CollectError::Connection(format!("{}: {}", self.endpoint.address, e)))?;
        self.conn = Some(conn);
        Ok(())
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("version", &self.version_string)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

fn probe_version<T: Connection>(conn: &mut T) -> Result<String, DriverError> {
    let rs = conn.query(VERSION_QUERY)?;
    rs.rows
        .first()
        .and_then(|row| row.first())
        .and_then(|v| v.as_text())
        .ok_or_else(|| DriverError::other("empty VERSION() result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockConnector;
    use crate::collector::mysql_collector::driver::{DriverError, ResultSet, SqlValue};
    use crate::collector::registry::{Address, Endpoint};

    const SOCK: &str = "/tmp/mysql.sock";

    fn endpoint() -> Endpoint {
        Endpoint::new(Address::Socket(SOCK.into()), "default")
    }

    fn one_row(value: &str) -> ResultSet {
        ResultSet::new(vec!["v".to_string()], vec![vec![SqlValue::from(value)]])
    }

    #[test]
    fn test_version_gate() {
        let v = |major, minor| ServerVersion {
            major,
            minor,
            mariadb: false,
        };
        assert!(!v(5, 0).supports_global_status_snapshot());
        assert!(v(5, 1).supports_global_status_snapshot());
        assert!(v(6, 0).supports_global_status_snapshot());
        assert!(!v(4, 9).supports_global_status_snapshot());
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(
            ServerVersion::parse("5.1.73-log"),
            ServerVersion {
                major: 5,
                minor: 1,
                mariadb: false
            }
        );
        let maria = ServerVersion::parse("10.6.12-MariaDB-1:10.6.12+maria~ubu2004");
        assert_eq!((maria.major, maria.minor, maria.mariadb), (10, 6, true));
        assert_eq!(ServerVersion::parse("8.0"), ServerVersion::parse("8.0.36"));
        assert_eq!(ServerVersion::parse("garbage"), ServerVersion::default());
        assert_eq!(ServerVersion::parse("5"), ServerVersion::default());
        assert_eq!(ServerVersion::parse(""), ServerVersion::default());
    }

    #[test]
    fn test_replica_status_gate() {
        assert!(!ServerVersion::parse("8.0.36").uses_replica_status());
        assert!(ServerVersion::parse("8.4.0").uses_replica_status());
        assert!(!ServerVersion::parse("11.2.2-MariaDB").uses_replica_status());
    }

    #[test]
    fn test_open_probes_version() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44-log");
        let session = Session::open(endpoint(), connector.clone()).unwrap();
        assert_eq!(session.version_string(), "5.7.44-log");
        assert!(session.supports_global_status_snapshot());
        assert!(session.is_open());
        assert_eq!(connector.open_connections(), 1);
    }

    #[test]
    fn test_open_fails_when_refused() {
        let connector = MockConnector::new();
        connector.refuse_connections(SOCK);
        let err = Session::open(endpoint(), connector.clone()).unwrap_err();
        assert!(matches!(err, CollectError::Connection(_)));
        assert_eq!(connector.open_connections(), 0);
    }

    #[test]
    fn test_open_fails_when_version_probe_fails() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        connector.fail_next(SOCK, VERSION_QUERY, DriverError::other("access denied"));
        let err = Session::open(endpoint(), connector.clone()).unwrap_err();
        assert!(matches!(err, CollectError::Connection(_)));
        // The half-open connection was released.
        assert_eq!(connector.open_connections(), 0);
    }

    #[test]
    fn test_query_recovers_from_single_severed_error() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        connector.set_response(SOCK, "SELECT 1", one_row("1"));
        let mut session = Session::open(endpoint(), connector.clone()).unwrap();

        connector.fail_next(SOCK, "SELECT 1", DriverError::severed("server has gone away"));
        let rs = session.query("SELECT 1").unwrap();
        assert_eq!(rs, one_row("1"));
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.open_connections(), 1);
    }

    #[test]
    fn test_query_escalates_when_retry_is_severed_too() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        let mut session = Session::open(endpoint(), connector.clone()).unwrap();

        connector.fail_next(SOCK, "SELECT 1", DriverError::severed("gone"));
        connector.fail_next(SOCK, "SELECT 1", DriverError::severed("gone again"));
        let err = session.query("SELECT 1").unwrap_err();
        assert!(matches!(err, CollectError::Connection(_)));
        assert!(!session.is_open());
        assert_eq!(connector.open_connections(), 0);
    }

    #[test]
    fn test_query_escalates_when_reconnect_fails() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        let mut session = Session::open(endpoint(), connector.clone()).unwrap();

        connector.fail_next(SOCK, "SELECT 1", DriverError::severed("gone"));
        connector.refuse_connections(SOCK);
        let err = session.query("SELECT 1").unwrap_err();
        assert!(matches!(err, CollectError::Connection(_)));
        assert_eq!(connector.open_connections(), 0);
    }

    #[test]
    fn test_other_errors_propagate_without_retry() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        let mut session = Session::open(endpoint(), connector.clone()).unwrap();

        connector.fail_next(SOCK, "SHOW BOGUS", DriverError::other("syntax error"));
        let err = session.query("SHOW BOGUS").unwrap_err();
        assert!(matches!(err, CollectError::Query(ref m) if m == "syntax error"));
        assert_eq!(connector.connects(), 1);
        assert!(session.is_open());
    }

    #[test]
    fn test_closed_session_reconnects_on_query() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        let mut session = Session::open(endpoint(), connector.clone()).unwrap();

        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(connector.open_connections(), 0);

        session.query("SELECT 1").unwrap();
        assert!(session.is_open());
        assert_eq!(connector.connects(), 2);
    }

    #[test]
    fn test_drop_releases_connection() {
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        {
            let _session = Session::open(endpoint(), connector.clone()).unwrap();
            assert_eq!(connector.open_connections(), 1);
        }
        assert_eq!(connector.open_connections(), 0);
    }
}
