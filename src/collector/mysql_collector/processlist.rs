//! `SHOW PROCESSLIST` connection-state census.

use std::collections::BTreeMap;

use super::driver::{Connector, ResultSet};
use super::queries::PROCESSLIST_QUERY;
use super::{CollectError, Session};
use crate::model::Observation;

/// Position of `Command` in `SHOW PROCESSLIST` output, used when the
/// driver reports no column names.
const COMMAND_COLUMN: usize = 4;

/// Normalizes a command name into a tag value: `Binlog Dump` -> `binlog_dump`.
fn state_tag(command: &str) -> String {
    command.trim().to_lowercase().replace(' ', "_")
}

/// Counts connections per command.
pub fn tally_states(rs: &ResultSet) -> BTreeMap<String, u64> {
    let column = rs.column_index("command").unwrap_or(COMMAND_COLUMN);
    let mut states = BTreeMap::new();

    for row in &rs.rows {
        let Some(command) = row.get(column).and_then(|v| v.as_text()) else {
            continue;
        };
        *states.entry(state_tag(&command)).or_insert(0) += 1;
    }

    states
}

/// Emits one `connection_states` observation per observed state.
pub fn emit_connection_states(rs: &ResultSet, timestamp: i64, schema: &str) -> Vec<Observation> {
    tally_states(rs)
        .into_iter()
        .map(|(state, count)| {
            Observation::new("connection_states", timestamp, count, schema).with_tag("state", state)
        })
        .collect()
}

impl<C: Connector> Session<C> {
    /// Collects the connection-state census.
    pub fn collect_connection_states(
        &mut self,
        timestamp: i64,
    ) -> Result<Vec<Observation>, CollectError> {
        let rs = self.query(PROCESSLIST_QUERY)?;
        Ok(emit_connection_states(&rs, timestamp, self.name()))
    }
}
