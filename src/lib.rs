//! Library re-exports for integration testing.
//! The main binary is in main.rs; this exposes selected modules for tests.

pub mod bridge;
pub mod call_log;
pub mod cli;
pub mod config;
pub mod console_log;
pub mod error;
pub mod extension;
pub mod ids;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod servers;
pub mod supervisor;
