//! `SHOW ENGINE INNODB STATUS` report parser.
//!
//! The report is free-form text. Only a handful of lines carry counters we
//! care about; each is recognised by one entry of an ordered rule table.
//! The first rule that matches a line wins and the parser moves on to the
//! next line. Lines no rule recognises are ignored.
//!
//! Example (5.1 era):
//!
//! ```text
//! =====================================
//! 110525 14:07:06 INNODB MONITOR OUTPUT
//! =====================================
//! ----------
//! SEMAPHORES
//! ----------
//! OS WAIT ARRAY INFO: reservation count 7, signal count 6
//! Mutex spin waits 12, rounds 340, OS waits 3
//! RW-shared spins 4, OS waits 2; RW-excl spins 0, OS waits 1
//! ```

use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime, TimeZone};
use regex::Regex;

use super::driver::Connector;
use super::queries::INNODB_STATUS_QUERY;
use super::{CollectError, Session};
use crate::model::Observation;

/// Column of `SHOW ENGINE INNODB STATUS` holding the report (`Type`, `Name`, `Status`).
const REPORT_COLUMN: usize = 2;

/// Where one capture group of a rule goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub metric: &'static str,
    pub tag: Option<(&'static str, &'static str)>,
}

const fn metric(metric: &'static str) -> Target {
    Target { metric, tag: None }
}

const fn lock(metric: &'static str, kind: &'static str) -> Target {
    Target {
        metric,
        tag: Some(("type", kind)),
    }
}

/// Rule table. Order matters where patterns share a prefix.
const RULES: &[(&str, &[Target])] = &[
    // SEMAPHORES
    (
        r"^OS WAIT ARRAY INFO: reservation count (\d+), signal count (\d+)",
        &[
            metric("innodb.oswait_array.reservation_count"),
            metric("innodb.oswait_array.signal_count"),
        ],
    ),
    (
        r"^Mutex spin waits (\d+), rounds (\d+), OS waits (\d+)",
        &[
            lock("innodb.locks.spin_waits", "mutex"),
            lock("innodb.locks.rounds", "mutex"),
            lock("innodb.locks.os_waits", "mutex"),
        ],
    ),
    (
        r"^RW-shared spins (\d+), OS waits (\d+); RW-excl spins (\d+), OS waits (\d+)",
        &[
            lock("innodb.locks.spin_waits", "rw-shared"),
            lock("innodb.locks.os_waits", "rw-shared"),
            lock("innodb.locks.spin_waits", "rw-exclusive"),
            lock("innodb.locks.os_waits", "rw-exclusive"),
        ],
    ),
    (
        r"^RW-shared spins (\d+), rounds (\d+), OS waits (\d+)",
        &[
            lock("innodb.locks.spin_waits", "rw-shared"),
            lock("innodb.locks.rounds", "rw-shared"),
            lock("innodb.locks.os_waits", "rw-shared"),
        ],
    ),
    (
        r"^RW-excl spins (\d+), rounds (\d+), OS waits (\d+)",
        &[
            lock("innodb.locks.spin_waits", "rw-exclusive"),
            lock("innodb.locks.rounds", "rw-exclusive"),
            lock("innodb.locks.os_waits", "rw-exclusive"),
        ],
    ),
    (
        r"^RW-sx spins (\d+), rounds (\d+), OS waits (\d+)",
        &[
            lock("innodb.locks.spin_waits", "rw-sx"),
            lock("innodb.locks.rounds", "rw-sx"),
            lock("innodb.locks.os_waits", "rw-sx"),
        ],
    ),
    // INSERT BUFFER AND ADAPTIVE HASH INDEX
    // 5.6+ puts the merge count on the same line, so it must precede the
    // older pattern, which is a prefix of it.
    (
        r"^Ibuf: size (\d+), free list len (\d+), seg size (\d+), (\d+) merges",
        &[
            metric("innodb.ibuf.size"),
            metric("innodb.ibuf.free_list_len"),
            metric("innodb.ibuf.seg_size"),
            metric("innodb.ibuf.merges"),
        ],
    ),
    (
        r"^Ibuf: size (\d+), free list len (\d+), seg size (\d+),",
        &[
            metric("innodb.ibuf.size"),
            metric("innodb.ibuf.free_list_len"),
            metric("innodb.ibuf.seg_size"),
        ],
    ),
    (
        r"^(\d+) inserts, (\d+) merged recs, (\d+) merges",
        &[
            metric("innodb.ibuf.inserts"),
            metric("innodb.ibuf.merged_recs"),
            metric("innodb.ibuf.merges"),
        ],
    ),
    // ROW OPERATIONS
    (
        r"^(\d+) queries inside InnoDB, (\d+) queries in queue",
        &[
            metric("innodb.queries_inside"),
            metric("innodb.queries_queued"),
        ],
    ),
    (
        r"^(\d+) read views open inside InnoDB",
        &[metric("innodb.opened_read_views")],
    ),
    // TRANSACTIONS
    (
        r"^History list length (\d+)",
        &[metric("innodb.history_list_length")],
    ),
];

struct Rule {
    pattern: Regex,
    targets: &'static [Target],
}

static COMPILED_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|&(pattern, targets)| Rule {
            pattern: Regex::new(pattern).expect("valid innodb rule"),
            targets,
        })
        .collect()
});

/// `110525 14:07:06 INNODB MONITOR OUTPUT` (up to 5.5).
static LEGACY_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{6}\s+\d{1,2}:\d\d:\d\d) INNODB MONITOR OUTPUT$").expect("valid regex")
});

/// `2024-03-01 10:15:42 0x7f3a2c1f8700 INNODB MONITOR OUTPUT` (5.6+).
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d\d-\d\d\s+\d{1,2}:\d\d:\d\d)\s+(?:0x[0-9a-fA-F]+\s+)?INNODB MONITOR OUTPUT$",
    )
    .expect("valid regex")
});

/// A captured counter and where it goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub target: Target,
    pub value: u64,
}

/// Outcome of running the rule table against one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch {
    Matched(Vec<Sample>),
    Unmatched,
}

/// Runs the rule table against a single line.
pub fn match_line(line: &str) -> LineMatch {
    for rule in COMPILED_RULES.iter() {
        let Some(caps) = rule.pattern.captures(line) else {
            continue;
        };

        let mut samples = Vec::with_capacity(rule.targets.len());
        for (i, target) in rule.targets.iter().enumerate() {
            let value = caps.get(i + 1).and_then(|m| m.as_str().parse::<u64>().ok());
            match value {
                Some(value) => samples.push(Sample {
                    target: *target,
                    value,
                }),
                // Out-of-range capture: the line doesn't count as a match.
                None => return LineMatch::Unmatched,
            }
        }
        return LineMatch::Matched(samples);
    }
    LineMatch::Unmatched
}

/// Extracts the report's own timestamp from its header, in local time.
pub fn report_timestamp(report: &str) -> Option<i64> {
    report.lines().find_map(|line| {
        let line = line.trim_end();
        if let Some(caps) = LEGACY_HEADER_RE.captures(line) {
            return parse_local(&caps[1], "%y%m%d %H:%M:%S");
        }
        if let Some(caps) = HEADER_RE.captures(line) {
            return parse_local(&caps[1], "%Y-%m-%d %H:%M:%S");
        }
        None
    })
}

fn parse_local(text: &str, format: &str) -> Option<i64> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&normalized, format).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}

/// Parses a report into observations.
///
/// All observations share one timestamp: the report header's if present,
/// otherwise `base_timestamp`. The sequence is produced lazily.
pub fn parse_innodb_status<'a>(
    report: &'a str,
    base_timestamp: i64,
    schema: &'a str,
) -> impl Iterator<Item = Observation> + 'a {
    let timestamp = report_timestamp(report).unwrap_or(base_timestamp);

    report
        .lines()
        .filter_map(|line| match match_line(line) {
            LineMatch::Matched(samples) => Some(samples),
            LineMatch::Unmatched => None,
        })
        .flatten()
        .map(move |sample| {
            let obs = Observation::new(sample.target.metric, timestamp, sample.value, schema);
            match sample.target.tag {
                Some((key, value)) => obs.with_tag(key, value),
                None => obs,
            }
        })
}

impl<C: Connector> Session<C> {
    /// Fetches the InnoDB status report and parses it.
    pub fn collect_innodb_status(&mut self, timestamp: i64) -> Result<Vec<Observation>, CollectError> {
        let rs = self.query(INNODB_STATUS_QUERY)?;
        let column = rs.column_index("status").unwrap_or(REPORT_COLUMN);
        let Some(report) = rs
            .rows
            .first()
            .and_then(|row| row.get(column))
            .and_then(|v| v.as_text())
        else {
            return Ok(Vec::new());
        };
        Ok(parse_innodb_status(&report, timestamp, self.name()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::scenarios::{INNODB_STATUS_51, INNODB_STATUS_57};
    use crate::model::MetricValue;

    fn collect(report: &str) -> Vec<Observation> {
        parse_innodb_status(report, 1_000, "default").collect()
    }

    fn find<'a>(obs: &'a [Observation], name: &str, kind: Option<&str>) -> Option<&'a Observation> {
        obs.iter()
            .find(|o| o.name == name && o.tag("type") == kind)
    }

    #[test]
    fn test_mutex_line_yields_three_tagged_metrics() {
        let obs = collect("Mutex spin waits 12, rounds 340, OS waits 3");
        assert_eq!(obs.len(), 3);
        let expected = [
            ("innodb.locks.spin_waits", 12),
            ("innodb.locks.rounds", 340),
            ("innodb.locks.os_waits", 3),
        ];
        for (o, (name, value)) in obs.iter().zip(expected) {
            assert_eq!(o.name, name);
            assert_eq!(o.value, MetricValue::UInt(value));
            assert_eq!(o.tag("type"), Some("mutex"));
            assert_eq!(o.schema(), "default");
            assert_eq!(o.timestamp, 1_000);
        }
    }

    #[test]
    fn test_history_list_length() {
        let obs = collect("History list length 42");
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].name, "innodb.history_list_length");
        assert_eq!(obs[0].value, MetricValue::UInt(42));
        assert_eq!(obs[0].tag("type"), None);
    }

    #[test]
    fn test_rw_line_yields_four_metrics() {
        let obs = collect("RW-shared spins 4, OS waits 2; RW-excl spins 5, OS waits 1");
        assert_eq!(obs.len(), 4);
        assert_eq!(
            find(&obs, "innodb.locks.spin_waits", Some("rw-shared")).unwrap().value,
            MetricValue::UInt(4)
        );
        assert_eq!(
            find(&obs, "innodb.locks.os_waits", Some("rw-exclusive")).unwrap().value,
            MetricValue::UInt(1)
        );
    }

    #[test]
    fn test_empty_and_garbage_reports_yield_nothing() {
        assert!(collect("").is_empty());
        assert!(collect("nothing to see here\n---\n\n").is_empty());
    }

    #[test]
    fn test_partial_match_is_skipped() {
        assert_eq!(match_line("History list length"), LineMatch::Unmatched);
        assert_eq!(match_line("History list length abc"), LineMatch::Unmatched);
        // Rules are anchored at the start of the line.
        assert_eq!(match_line("  History list length 5"), LineMatch::Unmatched);
    }

    #[test]
    fn test_overflowing_capture_is_unmatched() {
        assert_eq!(
            match_line("History list length 99999999999999999999999"),
            LineMatch::Unmatched
        );
    }

    #[test]
    fn test_ibuf_lines() {
        let obs = collect(
            "Ibuf: size 1, free list len 5, seg size 7,\n10 inserts, 8 merged recs, 3 merges",
        );
        let names: Vec<&str> = obs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "innodb.ibuf.size",
                "innodb.ibuf.free_list_len",
                "innodb.ibuf.seg_size",
                "innodb.ibuf.inserts",
                "innodb.ibuf.merged_recs",
                "innodb.ibuf.merges",
            ]
        );

        let obs = collect("Ibuf: size 1, free list len 0, seg size 2, 94 merges");
        assert_eq!(obs.len(), 4);
        assert_eq!(obs[3].name, "innodb.ibuf.merges");
        assert_eq!(obs[3].value, MetricValue::UInt(94));
    }

    #[test]
    fn test_queue_and_read_views() {
        let obs = collect("0 queries inside InnoDB, 7 queries in queue\n2 read views open inside InnoDB");
        assert_eq!(find(&obs, "innodb.queries_queued", None).unwrap().value, MetricValue::UInt(7));
        assert_eq!(find(&obs, "innodb.queries_inside", None).unwrap().value, MetricValue::UInt(0));
        assert_eq!(
            find(&obs, "innodb.opened_read_views", None).unwrap().value,
            MetricValue::UInt(2)
        );
    }

    #[test]
    fn test_legacy_header_overrides_timestamp() {
        let expected = Local
            .from_local_datetime(
                &NaiveDateTime::parse_from_str("110525 14:07:06", "%y%m%d %H:%M:%S").unwrap(),
            )
            .earliest()
            .unwrap()
            .timestamp();
        assert_eq!(report_timestamp(INNODB_STATUS_51), Some(expected));

        let obs = collect(INNODB_STATUS_51);
        assert!(!obs.is_empty());
        assert!(obs.iter().all(|o| o.timestamp == expected));
    }

    #[test]
    fn test_modern_header_overrides_timestamp() {
        let expected = Local
            .from_local_datetime(
                &NaiveDateTime::parse_from_str("2024-03-01 10:15:42", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
            )
            .earliest()
            .unwrap()
            .timestamp();
        assert_eq!(report_timestamp(INNODB_STATUS_57), Some(expected));
    }

    #[test]
    fn test_no_header_uses_base_timestamp() {
        assert_eq!(report_timestamp("History list length 1"), None);
        assert_eq!(collect("History list length 1")[0].timestamp, 1_000);
    }

    #[test]
    fn test_full_51_report() {
        let obs = collect(INNODB_STATUS_51);
        assert_eq!(
            find(&obs, "innodb.oswait_array.reservation_count", None).unwrap().value,
            MetricValue::UInt(7)
        );
        assert_eq!(
            find(&obs, "innodb.oswait_array.signal_count", None).unwrap().value,
            MetricValue::UInt(6)
        );
        assert_eq!(
            find(&obs, "innodb.locks.os_waits", Some("mutex")).unwrap().value,
            MetricValue::UInt(3)
        );
        assert_eq!(
            find(&obs, "innodb.history_list_length", None).unwrap().value,
            MetricValue::UInt(42)
        );
        assert_eq!(
            find(&obs, "innodb.ibuf.merged_recs", None).unwrap().value,
            MetricValue::UInt(0)
        );
    }

    #[test]
    fn test_full_57_report() {
        let obs = collect(INNODB_STATUS_57);
        assert_eq!(
            find(&obs, "innodb.locks.rounds", Some("rw-sx")).unwrap().value,
            MetricValue::UInt(12)
        );
        assert_eq!(
            find(&obs, "innodb.locks.spin_waits", Some("rw-exclusive")).unwrap().value,
            MetricValue::UInt(31)
        );
        assert_eq!(
            find(&obs, "innodb.ibuf.merges", None).unwrap().value,
            MetricValue::UInt(94)
        );
        assert_eq!(
            find(&obs, "innodb.history_list_length", None).unwrap().value,
            MetricValue::UInt(1184)
        );
        assert!(find(&obs, "innodb.locks.spin_waits", Some("mutex")).is_none());
    }

    #[test]
    fn test_reparse_is_idempotent() {
        assert_eq!(collect(INNODB_STATUS_51), collect(INNODB_STATUS_51));
    }

    #[test]
    fn test_unrelated_groups_are_order_insensitive() {
        let a = collect("History list length 5\nMutex spin waits 1, rounds 2, OS waits 3");
        let mut b = collect("Mutex spin waits 1, rounds 2, OS waits 3\nHistory list length 5");
        assert_eq!(a.len(), b.len());
        for o in &a {
            let pos = b.iter().position(|x| x == o).unwrap();
            b.remove(pos);
        }
        assert!(b.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let obs = collect("History list length 9\r\nMutex spin waits 1, rounds 2, OS waits 3\r\n");
        assert_eq!(obs.len(), 4);
    }
}
