//! Database client seam.
//!
//! The collectors only need to open a connection to an [`Address`], run a
//! text query and read rows with their column names. [`Connector`] and
//! [`Connection`] capture exactly that; [`MysqlConnector`] implements them on
//! top of the `mysql` crate and the mock module implements them for tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder};

use crate::collector::registry::Address;

/// MySQL client error codes meaning "the connection is gone".
const CR_SERVER_GONE_ERROR: u16 = 2006;
const CR_SERVER_LOST: u16 = 2013;

/// How the session should react to a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The connection was severed; reconnecting may help.
    Severed,
    /// Anything else.
    Other,
}

/// Error returned by a [`Connector`] or [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn severed(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Severed,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: DriverErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn is_severed(&self) -> bool {
        self.kind == DriverErrorKind::Severed
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DriverErrorKind::Severed => write!(f, "connection severed: {}", self.message),
            DriverErrorKind::Other => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<mysql::Error> for DriverError {
    fn from(e: mysql::Error) -> Self {
        let severed = match &e {
            mysql::Error::MySqlError(server) => {
                server.code == CR_SERVER_GONE_ERROR || server.code == CR_SERVER_LOST
            }
            other => other.is_connectivity_error(),
        };
        if severed {
            DriverError::severed(e.to_string())
        } else {
            DriverError::other(e.to_string())
        }
    }
}

/// A single cell of a result row, decoded from the text protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Returns the cell as text. `NULL` has no text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Int(v) => Some(v.to_string()),
            SqlValue::UInt(v) => Some(v.to_string()),
            SqlValue::Float(v) => Some(v.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }

    /// Returns the cell as a non-negative integer, parsing text if needed.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SqlValue::Int(v) => u64::try_from(*v).ok(),
            SqlValue::UInt(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null | SqlValue::Float(_) => None,
        }
    }

    /// Returns the cell as a signed integer, parsing text if needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::UInt(v) => i64::try_from(*v).ok(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Null | SqlValue::Float(_) => None,
        }
    }

}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<mysql::Value> for SqlValue {
    fn from(v: mysql::Value) -> Self {
        match v {
            mysql::Value::NULL => SqlValue::Null,
            mysql::Value::Int(i) => SqlValue::Int(i),
            mysql::Value::UInt(u) => SqlValue::UInt(u),
            mysql::Value::Float(f) => SqlValue::Float(f64::from(f)),
            mysql::Value::Double(d) => SqlValue::Float(d),
            mysql::Value::Bytes(bytes) => {
                SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            other => SqlValue::Text(other.as_sql(true)),
        }
    }
}

/// A fully fetched query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the index of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Username/password pair for one endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Resolves credentials for an endpoint address.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self, address: &Address) -> Credentials;
}

/// The same credentials for every endpoint.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl Default for StaticCredentials {
    fn default() -> Self {
        Self(Credentials::new("root", "mysql"))
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self, _address: &Address) -> Credentials {
        self.0.clone()
    }
}

/// An open connection able to run text queries.
pub trait Connection {
    /// Executes `sql` and fetches every row.
    fn query(&mut self, sql: &str) -> Result<ResultSet, DriverError>;

    /// Releases the connection.
    fn close(self);
}

/// Opens connections to endpoints.
pub trait Connector {
    type Conn: Connection;

    fn connect(&self, address: &Address) -> Result<Self::Conn, DriverError>;
}

/// [`Connector`] backed by the `mysql` crate.
#[derive(Clone)]
pub struct MysqlConnector {
    credentials: Arc<dyn CredentialProvider>,
    connect_timeout: Duration,
    query_timeout: Option<Duration>,
}

impl MysqlConnector {
    pub fn new(credentials: Arc<dyn CredentialProvider>, connect_timeout: Duration) -> Self {
        Self {
            credentials,
            connect_timeout,
            query_timeout: None,
        }
    }

    /// Bounds every read/write on the connection socket.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Socket read/write timeout.
    ///
    /// The driver applies it when the stream is opened and can't change it
    /// later, so it has to cover the handshake and the version probe too.
    /// Without a query timeout the connect timeout is used.
    fn io_timeout(&self) -> Duration {
        self.query_timeout.unwrap_or(self.connect_timeout)
    }

    fn opts(&self, address: &Address) -> OptsBuilder {
        let creds = self.credentials.credentials(address);
        let io_timeout = Some(self.io_timeout());
        let builder = OptsBuilder::new()
            .user(Some(creds.user))
            .pass(Some(creds.password))
            .tcp_connect_timeout(Some(self.connect_timeout))
            .read_timeout(io_timeout)
            .write_timeout(io_timeout);

        match address {
            Address::Socket(path) => builder
                .socket(Some(path.to_string_lossy().into_owned()))
                .prefer_socket(true),
            Address::Tcp { host, port } => builder
                .ip_or_hostname(Some(host.clone()))
                .tcp_port(*port)
                .prefer_socket(false),
        }
    }
}

impl Connector for MysqlConnector {
    type Conn = MysqlConnection;

    fn connect(&self, address: &Address) -> Result<MysqlConnection, DriverError> {
        let conn = Conn::new(self.opts(address))?;
        Ok(MysqlConnection { conn })
    }
}

/// Live connection from [`MysqlConnector`].
pub struct MysqlConnection {
    conn: Conn,
}

impl Connection for MysqlConnection {
    fn query(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        let mut result = self.conn.query_iter(sql)?;
        let columns: Vec<String> = result
            .columns()
            .as_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();

        let mut rows = Vec::new();
        if let Some(set) = result.iter() {
            for row in set {
                let row = row?;
                rows.push(row.unwrap().into_iter().map(SqlValue::from).collect());
            }
        }
        Ok(ResultSet::new(columns, rows))
    }

    fn close(self) {
        drop(self.conn);
    }
}
