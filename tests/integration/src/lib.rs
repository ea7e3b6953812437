//! Integration test utilities for the gateway client
//!
//! This crate provides a scripted in-memory transport and gateway frame
//! builders for running the connection end to end without a network.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
