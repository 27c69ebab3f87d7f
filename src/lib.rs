//! mysqlmon - MySQL metrics collector library.
//!
//! This library provides the core functionality used by the `mysqlmon`
//! binary: endpoint discovery, per-server sessions, status parsing and the
//! line-oriented metric output.

pub mod collector;
pub mod config;
pub mod model;
pub mod sink;
