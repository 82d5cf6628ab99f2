//! Common test utilities for slurp integration tests

#[allow(dead_code)]
pub mod fixtures;
#[allow(dead_code)]
pub mod nntp_server;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use nntp_server::*;
