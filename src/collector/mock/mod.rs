//! Test doubles for the discovery and database seams.
//!
//! This module provides `MockFs`, `MockConnector` and pre-built scenarios
//! for testing collectors without sockets or a running server.

mod connector;
mod filesystem;
pub mod scenarios;

pub use connector::{MockConnection, MockConnector};
pub use filesystem::MockFs;
