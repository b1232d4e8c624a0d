//! Command handlers for the `ledger` binary

pub mod commands;

pub use commands::{cmd_demo, cmd_keygen, resolve_config, CliResult};
