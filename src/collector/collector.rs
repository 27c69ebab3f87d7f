//! Collection cycle driver.
//!
//! The `Collector` owns the endpoint registry and one [`Session`] per tracked
//! endpoint. Each call to [`Collector::collect_cycle`] visits every session
//! in name order and writes what it collects straight to the metric sink.

use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info};

use crate::collector::mysql_collector::{CollectError, Connector, Session};
use crate::collector::registry::{Endpoint, EndpointRegistry};
use crate::collector::traits::FileSystem;
use crate::config::CollectorConfig;
use crate::sink::MetricWriter;

/// Process exit status understood by the external scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The cycle (or every cycle) completed.
    Success,
    /// No sockets and no static endpoints: don't retry soon.
    NothingToMonitor,
    /// The metric consumer went away.
    BrokenPipe,
    /// Invalid command-line or environment configuration.
    Misconfigured,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Misconfigured => 1,
            ExitStatus::BrokenPipe => 2,
            ExitStatus::NothingToMonitor => 13,
        }
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Sessions that completed every stage.
    pub collected: usize,
    /// Endpoints that failed and were dropped from the tracked set.
    pub failed: Vec<String>,
    /// Observations written, including those from sessions that later failed.
    pub observations: usize,
    /// Wall time of the cycle.
    pub duration: Duration,
}

/// Drives collection across every tracked endpoint.
pub struct Collector<F: FileSystem, C: Connector + Clone> {
    registry: EndpointRegistry<F>,
    connector: C,
    sessions: BTreeMap<String, Session<C>>,
}

impl<F: FileSystem, C: Connector + Clone> Collector<F, C> {
    /// Creates a collector. No connection is opened until the first cycle.
    pub fn new(fs: F, connector: C, config: CollectorConfig) -> Self {
        Self {
            registry: EndpointRegistry::new(fs, config),
            connector,
            sessions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        self.registry.config()
    }

    /// Returns `true` when discovery finds nothing and no static endpoint is
    /// configured.
    pub fn nothing_to_monitor(&self) -> bool {
        self.registry.is_empty()
    }

    /// Names of the tracked endpoints.
    pub fn tracked(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }

    pub fn session(&self, name: &str) -> Option<&Session<C>> {
        self.sessions.get(name)
    }

    /// Endpoints found by the last discovery pass, tracked or not.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.registry.endpoints()
    }

    /// Runs one cycle stamped with the current time.
    pub fn collect_cycle<W: Write>(
        &mut self,
        sink: &mut MetricWriter<W>,
    ) -> Result<CycleReport, CollectError> {
        self.collect_cycle_at(Utc::now().timestamp(), sink)
    }

    /// Runs one cycle stamped `timestamp`.
    ///
    /// InnoDB report observations keep the time printed in the report
    /// header when there is one.
    ///
    /// A failing session is closed and dropped; the others are unaffected.
    /// Only a broken output pipe aborts the cycle, and it is returned as-is.
    pub fn collect_cycle_at<W: Write>(
        &mut self,
        timestamp: i64,
        sink: &mut MetricWriter<W>,
    ) -> Result<CycleReport, CollectError> {
        let start = Instant::now();

        if self.registry.refresh_due() {
            let added = self.registry.refresh(&mut self.sessions, &self.connector);
            debug!(
                "endpoint refresh: {} added, {} tracked",
                added,
                self.sessions.len()
            );
        }

        let collect_mutex = self.registry.config().collect_innodb_mutex;
        let mut report = CycleReport::default();

        for (name, session) in self.sessions.iter_mut() {
            match collect_session(session, timestamp, collect_mutex, sink, &mut report.observations)
            {
                Ok(()) => report.collected += 1,
                Err(e) if e.is_broken_pipe() => return Err(e),
                Err(e) => {
                    error!("{}: {}", session.endpoint(), e);
                    report.failed.push(name.clone());
                }
            }
        }

        for name in &report.failed {
            if let Some(mut session) = self.sessions.remove(name) {
                session.close();
                info!("stopped tracking {}", name);
            }
            self.registry.mark_unreachable(name);
        }

        report.duration = start.elapsed();
        debug!(
            "cycle: {} collected, {} failed, {} observations in {:?}",
            report.collected,
            report.failed.len(),
            report.observations,
            report.duration
        );
        Ok(report)
    }

    /// Closes every session and forgets all endpoints.
    pub fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.close();
        }
        self.sessions.clear();
    }
}

/// Runs every stage for one session, writing observations as they arrive.
fn collect_session<C: Connector, W: Write>(
    session: &mut Session<C>,
    timestamp: i64,
    collect_mutex: bool,
    sink: &mut MetricWriter<W>,
    written: &mut usize,
) -> Result<(), CollectError> {
    let snapshot = session.collect_global_status(timestamp)?;
    *written += sink.write_all(snapshot.observations)?;

    if snapshot.has_innodb {
        *written += sink.write_all(session.collect_innodb_status(timestamp)?)?;
        if collect_mutex {
            *written += sink.write_all(session.collect_innodb_mutex(timestamp)?)?;
        }
    }

    *written += sink.write_all(session.collect_replication(timestamp)?)?;
    if let Some(master) = session.master_host() {
        debug!(
            "{} replicates from {} (executed {:?}, relayed {:?})",
            session.endpoint(),
            master,
            session.slave_bytes_executed(),
            session.relay_bytes_relayed()
        );
    }
    *written += sink.write_all(session.collect_connection_states(timestamp)?)?;
    Ok(())
}
