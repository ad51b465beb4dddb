//! Composition root for the sandboxed code-execution broker: CLI parsing,
//! config loading, docker-awareness, logging, and the sandbox-runner
//! collaborator contract.

pub mod cli;
pub mod config;
pub mod docker;
pub mod logging;
pub mod sandbox;

pub use cli::Cli;
