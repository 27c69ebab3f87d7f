//! MySQL metrics collector.
//!
//! Discovers local server instances by their socket files, keeps one session
//! per instance and turns the server's status surfaces into observations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Collector                           │
//! │  ┌────────────────────┐      ┌─────────────────────────────┐ │
//! │  │  EndpointRegistry  │      │   Session (per endpoint)    │ │
//! │  │  - search dirs     │─────▶│  - global status            │ │
//! │  │  - default sockets │      │  - InnoDB report / mutexes  │ │
//! │  │  - static TCP      │      │  - replication, processlist │ │
//! │  └─────────┬──────────┘      └──────────────┬──────────────┘ │
//! │            │                                │                │
//! │     ┌──────▼──────┐                  ┌──────▼──────┐         │
//! │     │  FileSystem │ (trait)          │  Connector  │ (trait) │
//! │     └──────┬──────┘                  └──────┬──────┘         │
//! └────────────┼────────────────────────────────┼────────────────┘
//!              │                                │
//!       ┌──────┴──────┐                 ┌───────┴────────┐
//!   ┌───▼───┐    ┌────▼───┐     ┌───────▼──────┐  ┌──────▼────────┐
//!   │RealFs │    │ MockFs │     │MysqlConnector│  │ MockConnector │
//!   └───────┘    └────────┘     └──────────────┘  └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use mysqlmon::collector::mock::{MockConnector, MockFs, scenarios};
//! use mysqlmon::collector::Collector;
//! use mysqlmon::config::CollectorConfig;
//! use mysqlmon::sink::MetricWriter;
//!
//! let connector = MockConnector::new();
//! scenarios::typical_server(&connector, "/tmp/mysql.sock");
//! let mut fs = MockFs::new();
//! fs.add_socket("/tmp/mysql.sock");
//!
//! let mut collector = Collector::new(fs, connector, CollectorConfig::default());
//! let mut sink = MetricWriter::new(Vec::new(), "mysql");
//! let report = collector.collect_cycle(&mut sink).unwrap();
//! assert_eq!(report.collected, 1);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod mysql_collector;
pub mod registry;
pub mod traits;

pub use collector::{Collector, CycleReport, ExitStatus};
pub use mock::MockFs;
pub use mysql_collector::{
    CollectError, Connector, CredentialProvider, Credentials, MysqlConnector, Session,
    StaticCredentials,
};
pub use registry::{Address, Endpoint, EndpointRegistry};
pub use traits::{FileSystem, RealFs};
