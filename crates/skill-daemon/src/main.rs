//! Skill Engine
//!
//! Answers natural-language questions about a curated set of skill records.
//!
//! # Usage
//!
//! ```bash
//! skill-engine ask "What is your experience with Python?" [--json]
//! skill-engine reindex [--max-batches N] [--fresh]
//! skill-engine quota status|reset|resync --consumed N --count N
//! skill-engine health
//! skill-engine cache purge
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/skill-engine/config.toml)
//! 3. `--config` file
//! 4. Environment variables (SKILL_*)
//! 5. CLI flags

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use skill_daemon::{run, Cli};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let code = run(cli).await?;
    Ok(ExitCode::from(code))
}
