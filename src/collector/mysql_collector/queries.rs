//! SQL statements issued by the collector.

use super::session::ServerVersion;

pub(crate) const VERSION_QUERY: &str = "SELECT VERSION()";
pub(crate) const GLOBAL_STATUS_QUERY: &str = "SHOW GLOBAL STATUS";
pub(crate) const INNODB_STATUS_QUERY: &str = "SHOW ENGINE INNODB STATUS";
pub(crate) const INNODB_MUTEX_QUERY: &str = "SHOW ENGINE INNODB MUTEX";
pub(crate) const PROCESSLIST_QUERY: &str = "SHOW PROCESSLIST";

/// Builds the version-aware replication status query.
pub(crate) fn build_replication_status_query(version: ServerVersion) -> &'static str {
    if version.uses_replica_status() {
        "SHOW REPLICA STATUS"
    } else {
        "SHOW SLAVE STATUS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replication_query_by_version() {
        assert_eq!(
            build_replication_status_query(ServerVersion::parse("5.7.44")),
            "SHOW SLAVE STATUS"
        );
        assert_eq!(
            build_replication_status_query(ServerVersion::parse("8.4.2")),
            "SHOW REPLICA STATUS"
        );
        assert_eq!(
            build_replication_status_query(ServerVersion::parse("10.11.6-MariaDB")),
            "SHOW SLAVE STATUS"
        );
    }
}
