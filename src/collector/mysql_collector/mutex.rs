//! `SHOW ENGINE INNODB MUTEX` collection.
//!
//! Disabled by default: the statement is expensive on busy servers.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::driver::{Connector, ResultSet};
use super::queries::INNODB_MUTEX_QUERY;
use super::{CollectError, Session};
use crate::model::Observation;

/// `…&buf_pool->mutex` or `…&kernel_mutex`.
static MUTEX_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(\w+)(?:->(\w+))?$").expect("valid regex"));

/// Extracts `mutex` or `mutex.kind` from a mutex location string.
pub fn mutex_name(location: &str) -> Option<String> {
    let caps = MUTEX_NAME_RE.captures(location)?;
    let mut name = caps.get(1)?.as_str().to_string();
    if let Some(kind) = caps.get(2) {
        name.push('.');
        name.push_str(kind.as_str());
    }
    Some(name)
}

/// Sums `os_waits=N` per mutex name.
pub fn tally_os_waits(rs: &ResultSet) -> BTreeMap<String, u64> {
    let mut waits = BTreeMap::new();

    for row in &rs.rows {
        let (Some(location), Some(status)) = (
            row.get(1).and_then(|v| v.as_text()),
            row.get(2).and_then(|v| v.as_text()),
        ) else {
            continue;
        };
        if !status.starts_with("os_waits") {
            continue;
        }
        let Some(name) = mutex_name(&location) else {
            continue;
        };
        let Some(count) = status
            .split_once('=')
            .and_then(|(_, n)| n.trim().parse::<u64>().ok())
        else {
            continue;
        };
        *waits.entry(name).or_insert(0) += count;
    }

    waits
}

/// Emits one `innodb.locks` observation per mutex.
pub fn emit_mutex_waits(rs: &ResultSet, timestamp: i64, schema: &str) -> Vec<Observation> {
    tally_os_waits(rs)
        .into_iter()
        .map(|(mutex, count)| {
            Observation::new("innodb.locks", timestamp, count, schema).with_tag("mutex", mutex)
        })
        .collect()
}

impl<C: Connector> Session<C> {
    /// Collects per-mutex OS wait counts.
    pub fn collect_innodb_mutex(&mut self, timestamp: i64) -> Result<Vec<Observation>, CollectError> {
        let rs = self.query(INNODB_MUTEX_QUERY)?;
        Ok(emit_mutex_waits(&rs, timestamp, self.name()))
    }
}
