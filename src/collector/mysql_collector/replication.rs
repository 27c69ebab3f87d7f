//! `SHOW SLAVE STATUS` / `SHOW REPLICA STATUS` collection.

use std::collections::HashMap;

use super::driver::{Connector, ResultSet, SqlValue};
use super::queries::build_replication_status_query;
use super::{CollectError, Session};
use crate::model::Observation;

/// Legacy column name and its 8.x replacement.
const MASTER_HOST: (&str, &str) = ("master_host", "source_host");
const SECONDS_BEHIND: (&str, &str) = ("seconds_behind_master", "seconds_behind_source");
const EXEC_POS: (&str, &str) = ("exec_master_log_pos", "exec_source_log_pos");
const READ_POS: (&str, &str) = ("read_master_log_pos", "read_source_log_pos");
const IO_RUNNING: (&str, &str) = ("slave_io_running", "replica_io_running");
const SQL_RUNNING: (&str, &str) = ("slave_sql_running", "replica_sql_running");

/// Replication state worth remembering between polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationState {
    pub master_host: String,
    pub bytes_executed: Option<u64>,
    pub bytes_relayed: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationReport {
    pub observations: Vec<Observation>,
    /// `None` when the server is not a replica.
    pub state: Option<ReplicationState>,
}

/// Converts the first row into a map keyed by lower-cased column name.
fn row_to_map(rs: &ResultSet) -> Option<HashMap<String, &SqlValue>> {
    let row = rs.rows.first()?;
    Some(
        rs.columns
            .iter()
            .map(|c| c.to_lowercase())
            .zip(row.iter())
            .collect(),
    )
}

fn lookup<'a>(fields: &HashMap<String, &'a SqlValue>, names: (&str, &str)) -> Option<&'a SqlValue> {
    fields.get(names.0).or_else(|| fields.get(names.1)).copied()
}

fn is_yes(value: &SqlValue) -> u64 {
    match value.as_text() {
        Some(s) if s.trim().eq_ignore_ascii_case("yes") => 1,
        _ => 0,
    }
}

/// Emits replica lag, positions and thread states.
///
/// Nothing is emitted unless the server replicates from a master: an empty
/// result, a `NULL`/empty master host or the literal `None` all mean "not a
/// replica".
pub fn emit_replication_status(rs: &ResultSet, timestamp: i64, schema: &str) -> ReplicationReport {
    let mut report = ReplicationReport::default();
    let Some(fields) = row_to_map(rs) else {
        return report;
    };

    let master_host = lookup(&fields, MASTER_HOST)
        .and_then(SqlValue::as_text)
        .filter(|h| !h.is_empty() && !h.eq_ignore_ascii_case("none"));
    let Some(master_host) = master_host else {
        return report;
    };

    let obs = &mut report.observations;

    if let Some(lag) = lookup(&fields, SECONDS_BEHIND).and_then(SqlValue::as_i64) {
        obs.push(Observation::new("slave.seconds_behind_master", timestamp, lag, schema));
    }

    let bytes_executed = lookup(&fields, EXEC_POS).and_then(SqlValue::as_u64);
    if let Some(v) = bytes_executed {
        obs.push(Observation::new("slave.bytes_executed", timestamp, v, schema));
    }
    let bytes_relayed = lookup(&fields, READ_POS).and_then(SqlValue::as_u64);
    if let Some(v) = bytes_relayed {
        obs.push(Observation::new("slave.bytes_relayed", timestamp, v, schema));
    }

    if let Some(v) = lookup(&fields, IO_RUNNING) {
        obs.push(Observation::new("slave.thread_io_running", timestamp, is_yes(v), schema));
    }
    if let Some(v) = lookup(&fields, SQL_RUNNING) {
        obs.push(Observation::new("slave.thread_sql_running", timestamp, is_yes(v), schema));
    }

    report.state = Some(ReplicationState {
        master_host,
        bytes_executed,
        bytes_relayed,
    });
    report
}

impl<C: Connector> Session<C> {
    /// Collects replication metrics and caches the replication state.
    pub fn collect_replication(&mut self, timestamp: i64) -> Result<Vec<Observation>, CollectError> {
        let rs = self.query(build_replication_status_query(self.version()))?;
        let report = emit_replication_status(&rs, timestamp, self.name());

        match report.state {
            Some(state) => {
                self.master_host = Some(state.master_host);
                self.slave_bytes_executed = state.bytes_executed;
                self.relay_bytes_relayed = state.bytes_relayed;
            }
            None => {
                self.master_host = None;
                self.slave_bytes_executed = None;
                self.relay_bytes_relayed = None;
            }
        }

        Ok(report.observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockConnector, scenarios};
    use crate::collector::registry::{Address, Endpoint};
    use crate::model::MetricValue;

    fn slave_status(pairs: &[(&str, SqlValue)]) -> ResultSet {
        ResultSet::new(
            pairs.iter().map(|(k, _)| k.to_string()).collect(),
            vec![pairs.iter().map(|(_, v)| v.clone()).collect()],
        )
    }

    fn replica(master: &str, io: &str) -> ResultSet {
        slave_status(&[
            ("Master_Host", SqlValue::from(master)),
            ("Read_Master_Log_Pos", SqlValue::from("2048")),
            ("Slave_IO_Running", SqlValue::from(io)),
            ("Slave_SQL_Running", SqlValue::from("Yes")),
            ("Exec_Master_Log_Pos", SqlValue::from("1024")),
            ("Seconds_Behind_Master", SqlValue::from("3")),
        ])
    }

    fn value_of(report: &ReplicationReport, name: &str) -> Option<MetricValue> {
        report
            .observations
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.value)
    }

    #[test]
    fn test_none_master_emits_nothing() {
        let report = emit_replication_status(&replica("None", "Yes"), 1, "default");
        assert!(report.observations.is_empty());
        assert!(report.state.is_none());
    }

    #[test]
    fn test_empty_result_emits_nothing() {
        let rs = ResultSet::new(vec!["Master_Host".to_string()], Vec::new());
        let report = emit_replication_status(&rs, 1, "default");
        assert!(report.observations.is_empty());

        let rs = slave_status(&[("Master_Host", SqlValue::Null)]);
        assert!(emit_replication_status(&rs, 1, "default").observations.is_empty());
    }

    #[test]
    fn test_io_thread_running_yes() {
        let report = emit_replication_status(&replica("db1.internal", "Yes"), 1, "default");
        assert_eq!(value_of(&report, "slave.thread_io_running"), Some(MetricValue::UInt(1)));
        assert_eq!(value_of(&report, "slave.thread_sql_running"), Some(MetricValue::UInt(1)));
        assert_eq!(value_of(&report, "slave.seconds_behind_master"), Some(MetricValue::Int(3)));
        assert_eq!(value_of(&report, "slave.bytes_executed"), Some(MetricValue::UInt(1024)));
        assert_eq!(value_of(&report, "slave.bytes_relayed"), Some(MetricValue::UInt(2048)));
        assert_eq!(report.observations.len(), 5);

        let state = report.state.unwrap();
        assert_eq!(state.master_host, "db1.internal");
        assert_eq!(state.bytes_executed, Some(1024));
        assert_eq!(state.bytes_relayed, Some(2048));
    }

    #[test]
    fn test_io_thread_running_no() {
        let report = emit_replication_status(&replica("db1.internal", "No"), 1, "default");
        assert_eq!(value_of(&report, "slave.thread_io_running"), Some(MetricValue::UInt(0)));

        let report = emit_replication_status(&replica("db1.internal", "Connecting"), 1, "default");
        assert_eq!(value_of(&report, "slave.thread_io_running"), Some(MetricValue::UInt(0)));
    }

    #[test]
    fn test_null_lag_is_skipped() {
        let rs = slave_status(&[
            ("Master_Host", SqlValue::from("db1.internal")),
            ("Seconds_Behind_Master", SqlValue::Null),
            ("Slave_IO_Running", SqlValue::from("yes")),
        ]);
        let report = emit_replication_status(&rs, 1, "default");
        assert_eq!(value_of(&report, "slave.seconds_behind_master"), None);
        assert_eq!(value_of(&report, "slave.thread_io_running"), Some(MetricValue::UInt(1)));
    }

    #[test]
    fn test_replica_column_names() {
        let rs = slave_status(&[
            ("Source_Host", SqlValue::from("primary.internal")),
            ("Replica_IO_Running", SqlValue::from("Yes")),
            ("Replica_SQL_Running", SqlValue::from("No")),
            ("Seconds_Behind_Source", SqlValue::from("0")),
            ("Exec_Source_Log_Pos", SqlValue::from("77")),
        ]);
        let report = emit_replication_status(&rs, 1, "default");
        assert_eq!(value_of(&report, "slave.thread_io_running"), Some(MetricValue::UInt(1)));
        assert_eq!(value_of(&report, "slave.thread_sql_running"), Some(MetricValue::UInt(0)));
        assert_eq!(value_of(&report, "slave.seconds_behind_master"), Some(MetricValue::Int(0)));
        assert_eq!(value_of(&report, "slave.bytes_executed"), Some(MetricValue::UInt(77)));
        assert_eq!(report.state.unwrap().master_host, "primary.internal");
    }

    #[test]
    fn test_session_caches_replication_state() {
        const SOCK: &str = "/tmp/mysql.sock";
        let connector = MockConnector::new();
        connector.add_server(SOCK, "5.7.44");
        connector.set_response(
            SOCK,
            "SHOW SLAVE STATUS",
            scenarios::slave_status("db1.internal", "Yes", "0"),
        );
        let endpoint = Endpoint::new(Address::Socket(SOCK.into()), "default");
        let mut session = Session::open(endpoint, connector.clone()).unwrap();
        assert_eq!(session.master_host(), None);

        let observations = session.collect_replication(1).unwrap();
        assert!(!observations.is_empty());
        assert_eq!(session.master_host(), Some("db1.internal"));
        assert_eq!(session.slave_bytes_executed(), Some(4000));
        assert_eq!(session.relay_bytes_relayed(), Some(4096));

        // Replication was reset on the server.
        connector.set_response(SOCK, "SHOW SLAVE STATUS", ResultSet::default());
        assert!(session.collect_replication(2).unwrap().is_empty());
        assert_eq!(session.master_host(), None);
        assert_eq!(session.slave_bytes_executed(), None);
        assert_eq!(session.relay_bytes_relayed(), None);
    }
}
