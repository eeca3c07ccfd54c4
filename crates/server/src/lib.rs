//! segmentd server library.
//!
//! Provides the HTTP API, configuration loading, store bootstrap, the TTL
//! sweeper background task, and shutdown handling. The `segmentd` binary is a
//! thin wrapper over these modules.

#![deny(unsafe_code)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod shutdown;
pub mod sweeper;
