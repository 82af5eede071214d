//! Test utilities for the `bang` load generator.
//!
//! This crate provides an in-process HTTP server to run load against, and logging setup for
//! tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
