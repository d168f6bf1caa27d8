//! CLI argument definitions for seeBeads.

use crate::SourceFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// seeBeads - a live view of a Beads issue graph.
///
/// Reads `.beads/beads.db` or `.beads/issues.jsonl` and answers queries over
/// the resolved parent/child and blocker graph.
#[derive(Parser, Debug)]
#[command(name = "seebeads")]
#[command(author, version, about = "A live, queryable view of a Beads issue graph", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if seebeads was started in <path> instead of the current directory.
    /// Can also be set via SEEBEADS_DIR environment variable.
    #[arg(short = 'C', long = "dir", global = true, env = "SEEBEADS_DIR")]
    pub dir: Option<PathBuf>,

    /// Read this data file instead of discovering one under .beads/
    #[arg(long = "data", global = true, env = "SEEBEADS_DATA")]
    pub data: Option<PathBuf>,

    /// Source encoding (jsonl or sqlite); inferred from the extension if omitted
    #[arg(long = "format", global = true)]
    pub format: Option<SourceFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate counts: status, type, priority, blocked, ready, stale, velocity
    Stats,

    /// List beads matching filters, sorted by priority then newest first
    List {
        /// Only these statuses (comma-separated, e.g. open,in_progress)
        #[arg(long, value_delimiter = ',')]
        status: Vec<String>,

        /// Only these types (comma-separated, e.g. bug,feature)
        #[arg(long = "type", value_delimiter = ',')]
        issue_type: Vec<String>,

        /// Only these priorities (comma-separated, accepts 1 or p1)
        #[arg(long, value_delimiter = ',', value_parser = parse_priority)]
        priority: Vec<i64>,

        /// Require every label (comma-separated, case-sensitive)
        #[arg(long, value_delimiter = ',')]
        label: Vec<String>,

        /// Case-insensitive text search over id, title and description
        #[arg(long, short = 's')]
        search: Option<String>,

        /// Only beads that are ready to work on
        #[arg(long)]
        ready: bool,

        /// Maximum results (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        /// Skip this many results
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Show one bead with its parent, children, blockers and blocked beads
    Show {
        /// Bead ID (e.g., bd-a1b2, bd-a1b2.1)
        id: String,
    },

    /// Epics with child completion counts
    Epics,

    /// Source file, size, last rebuild and diagnostics
    Health {
        /// Include every per-record diagnostic
        #[arg(long)]
        diagnostics: bool,
    },

    /// Watch the data file and print one JSON event per line until Ctrl-C
    Watch {
        /// Use the long debounce window for bursts of automated writes
        #[arg(long)]
        agent_mode: bool,

        /// Interactive debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Show resolved settings and where each value came from
    Config,

    /// Show version, git commit and build time
    Version,
}

/// Parse `2` or `p2`.
pub fn parse_priority(s: &str) -> Result<i64, String> {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix(['p', 'P']).unwrap_or(trimmed);
    digits
        .parse()
        .map_err(|_| format!("invalid priority '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_filters() {
        let cli = Cli::parse_from([
            "seebeads", "list", "--status", "open,blocked", "--priority", "p0,1", "--label", "ui",
            "--ready", "--limit", "5",
        ]);
        match cli.command {
            Commands::List {
                status,
                priority,
                label,
                ready,
                limit,
                offset,
                ..
            } => {
                assert_eq!(status, vec!["open", "blocked"]);
                assert_eq!(priority, vec![0, 1]);
                assert_eq!(label, vec!["ui"]);
                assert!(ready);
                assert_eq!(limit, 5);
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["seebeads", "stats", "-H", "--format", "sqlite", "--data", "x.db"]);
        assert!(cli.human_readable);
        assert_eq!(cli.format, Some(SourceFormat::Sqlite));
        assert_eq!(cli.data, Some(PathBuf::from("x.db")));
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority("p3"), Ok(3));
        assert_eq!(parse_priority("0"), Ok(0));
        assert!(parse_priority("high").is_err());
    }
}
