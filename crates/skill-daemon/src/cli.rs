//! CLI argument parsing for skill-engine.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Skill Engine
///
/// Answers questions about a curated set of professional-skill records.
#[derive(Parser, Debug)]
#[command(name = "skill-engine")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/skill-engine/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a question
    Ask {
        /// The question text
        query: String,

        /// Token that opens the availability window
        #[arg(long)]
        bypass_token: Option<String>,

        /// Print the structured response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild stored embeddings (resumes an interrupted run)
    Reindex {
        /// Item type to reindex
        #[arg(long, default_value = "skill")]
        item_type: String,

        /// Records per batch (new runs only)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Stop after this many batches
        #[arg(long)]
        max_batches: Option<usize>,

        /// Discard the checkpoint and start a new version
        #[arg(long)]
        fresh: bool,
    },

    /// Daily inference budget
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },

    /// Show vector backend health
    Health,

    /// Response cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum QuotaCommands {
    /// Show today's consumption
    Status,

    /// Clear today's counters
    Reset,

    /// Overwrite today's counters with absolute values
    Resync {
        /// Consumed cost units
        #[arg(long)]
        consumed: u64,

        /// Inference count
        #[arg(long)]
        count: u64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommands {
    /// Remove expired key-value entries
    Purge,

    /// Drop the cached reply for a question
    Invalidate {
        /// Question text; normalized the same way as lookups
        query: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_ask() {
        let cli = Cli::parse_from(["skill-engine", "ask", "Python experience?", "--json"]);
        match cli.command {
            Commands::Ask {
                query,
                bypass_token,
                json,
            } => {
                assert_eq!(query, "Python experience?");
                assert_eq!(bypass_token, None);
                assert!(json);
            }
            _ => panic!("Expected Ask command"),
        }
    }

    #[test]
    fn test_cli_reindex_defaults() {
        let cli = Cli::parse_from(["skill-engine", "reindex"]);
        match cli.command {
            Commands::Reindex {
                item_type,
                batch_size,
                max_batches,
                fresh,
            } => {
                assert_eq!(item_type, "skill");
                assert_eq!(batch_size, None);
                assert_eq!(max_batches, None);
                assert!(!fresh);
            }
            _ => panic!("Expected Reindex command"),
        }
    }

    #[test]
    fn test_cli_reindex_flags() {
        let cli = Cli::parse_from([
            "skill-engine",
            "reindex",
            "--batch-size",
            "8",
            "--max-batches",
            "2",
            "--fresh",
        ]);
        match cli.command {
            Commands::Reindex {
                batch_size,
                max_batches,
                fresh,
                ..
            } => {
                assert_eq!(batch_size, Some(8));
                assert_eq!(max_batches, Some(2));
                assert!(fresh);
            }
            _ => panic!("Expected Reindex command"),
        }
    }

    #[test]
    fn test_cli_quota_resync() {
        let cli = Cli::parse_from([
            "skill-engine",
            "quota",
            "resync",
            "--consumed",
            "120",
            "--count",
            "7",
        ]);
        match cli.command {
            Commands::Quota {
                command: QuotaCommands::Resync { consumed, count },
            } => {
                assert_eq!(consumed, 120);
                assert_eq!(count, 7);
            }
            _ => panic!("Expected Quota Resync command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "skill-engine",
            "health",
            "--config",
            "/path/to/config.toml",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Health));
    }

    #[test]
    fn test_cli_cache_purge() {
        let cli = Cli::parse_from(["skill-engine", "cache", "purge"]);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: CacheCommands::Purge
            }
        ));
    }

    #[test]
    fn test_cli_cache_invalidate() {
        let cli = Cli::parse_from(["skill-engine", "cache", "invalidate", "Python experience?"]);
        match cli.command {
            Commands::Cache {
                command: CacheCommands::Invalidate { query },
            } => assert_eq!(query, "Python experience?"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
