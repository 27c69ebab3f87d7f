//! `SHOW GLOBAL STATUS` collection.

use tracing::trace;

use super::driver::{Connector, ResultSet};
use super::queries::GLOBAL_STATUS_QUERY;
use super::{CollectError, Session};
use crate::model::{MetricValue, Observation};

/// Status variables with this prefix mean the InnoDB engine is active.
const INNODB_PREFIX: &str = "innodb";

/// Observations from one snapshot plus what they revealed about the server.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub observations: Vec<Observation>,
    /// At least one emitted variable belongs to InnoDB.
    pub has_innodb: bool,
}

/// Converts `(Variable_name, Value)` rows into observations.
///
/// Values containing a `.` become floats, other numeric values integers.
/// Non-numeric values (`ON`, `TLSv1.2`, empty, `NULL`) are skipped.
pub fn emit_global_status(rs: &ResultSet, timestamp: i64, schema: &str) -> StatusSnapshot {
    let mut snapshot = StatusSnapshot::default();

    for row in &rs.rows {
        let (Some(name), Some(value)) = (row.first(), row.get(1)) else {
            continue;
        };
        let (Some(name), Some(value)) = (name.as_text(), value.as_text()) else {
            continue;
        };
        let Some(value) = MetricValue::parse(&value) else {
            trace!("{}: skipping non-numeric status {}={:?}", schema, name, value);
            continue;
        };

        let name = name.to_lowercase();
        snapshot.has_innodb |= name.starts_with(INNODB_PREFIX);
        snapshot
            .observations
            .push(Observation::new(name, timestamp, value, schema));
    }

    snapshot
}

impl<C: Connector> Session<C> {
    /// Collects the server-wide status snapshot.
    ///
    /// Returns an empty snapshot without querying on servers older than 5.1.
    pub fn collect_global_status(&mut self, timestamp: i64) -> Result<StatusSnapshot, CollectError> {
        if !self.supports_global_status_snapshot() {
            trace!("{}: skipping global status on {}", self.name(), self.version());
            return Ok(StatusSnapshot::default());
        }
        let rs = self.query(GLOBAL_STATUS_QUERY)?;
        Ok(emit_global_status(&rs, timestamp, self.name()))
    }
}
