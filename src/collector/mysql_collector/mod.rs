//! MySQL metrics collector.
//!
//! Collects metrics from the server's status surfaces:
//! - `SHOW GLOBAL STATUS`: server-wide counters (5.1+ only)
//! - `SHOW ENGINE INNODB STATUS`: free-form InnoDB report, parsed line by line
//! - `SHOW ENGINE INNODB MUTEX`: per-mutex waits (opt-in)
//! - `SHOW SLAVE STATUS` / `SHOW REPLICA STATUS`: replication lag and threads
//! - `SHOW PROCESSLIST`: connections per command
//!
//! ## Sessions
//!
//! Each endpoint gets one [`Session`] that owns its connection. A query that
//! fails because the server went away reconnects and retries once before the
//! error is reported.

mod driver;
mod innodb;
mod mutex;
mod processlist;
mod queries;
mod replication;
mod session;
mod status;

use std::fmt;
use std::io;

pub use driver::{
    Connection, Connector, CredentialProvider, Credentials, DriverError, DriverErrorKind,
    MysqlConnection, MysqlConnector, ResultSet, SqlValue, StaticCredentials,
};
pub use innodb::{LineMatch, Sample, Target, match_line, parse_innodb_status, report_timestamp};
pub use mutex::{emit_mutex_waits, mutex_name};
pub use processlist::{emit_connection_states, tally_states};
pub use replication::{ReplicationReport, ReplicationState, emit_replication_status};
pub use session::{ServerVersion, Session};
pub use status::{StatusSnapshot, emit_global_status};

pub(crate) use queries::{
    GLOBAL_STATUS_QUERY, INNODB_MUTEX_QUERY, INNODB_STATUS_QUERY, PROCESSLIST_QUERY, VERSION_QUERY,
};

/// Error type for MySQL collection.
#[derive(Debug)]
pub enum CollectError {
    /// Opening or re-opening a connection failed.
    Connection(String),
    /// Query execution failed.
    Query(String),
    /// Writing metrics failed.
    Output(io::Error),
}

impl CollectError {
    /// The metric consumer has gone away; nothing more can be delivered.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, CollectError::Output(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Connection(msg) => write!(f, "MySQL: {}", msg),
            CollectError::Query(msg) => write!(f, "MySQL query error: {}", msg),
            CollectError::Output(e) => write!(f, "output error: {}", e),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Output(e)
    }
}
