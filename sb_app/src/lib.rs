//! # sb_app
//!
//! Shared wiring for binaries built on the dispatcher

pub mod cli;
pub mod config_loader;
pub mod shutdown_handler;
pub mod tracing_setup;
