// ABOUTME: Library root for verdigris - blue/green deployment orchestration.
// ABOUTME: The CLI binary is in main.rs.

pub mod artifact;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod group;
pub mod output;
pub mod pool;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod types;
