//! skill-engine library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (ask, reindex, quota, health, cache)

pub mod cli;
pub mod commands;

pub use cli::{CacheCommands, Cli, Commands, QuotaCommands};
pub use commands::{
    handle_ask, handle_cache, handle_health, handle_quota, handle_reindex, run, Engine,
    QUERY_ERROR_EXIT,
};
