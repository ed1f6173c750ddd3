//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Two-agent negotiation runner
///
/// Actions proposed by one reasoning backend are executed only after a second
/// backend restates them identically.
#[derive(Parser, Debug)]
#[command(name = "accord")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The command to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Settings file (default: ./accord.toml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Base directory holding the memory, scripts, tools and logs
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Enable debug diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print version information
    #[arg(long)]
    pub version: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the negotiation session with the interactive console
    Run {
        /// Resume immediately instead of starting paused
        #[arg(long)]
        start: bool,
    },

    /// Only run the agent connectivity check
    Check,

    /// Inspect the memory store
    Memory {
        #[command(subcommand)]
        cmd: MemoryCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum MemoryCommand {
    /// List flat files in the memory directory
    List,
    /// Search memory records, or one memory file
    Search {
        /// Case-sensitive substring to look for
        term: String,
        /// File to search, or ALL for the record store
        #[arg(short, long, default_value = "ALL")]
        file: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_no_command() {
        let cli = Cli::parse_from(["accord"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_run_with_global_flags() {
        let cli = Cli::parse_from(["accord", "run", "--start", "--base-dir", "/srv/agent", "-v"]);
        assert_eq!(cli.command, Some(Commands::Run { start: true }));
        assert_eq!(cli.base_dir, Some(PathBuf::from("/srv/agent")));
        assert!(cli.verbose);
    }

    #[test]
    fn test_memory_search_defaults_to_all() {
        let cli = Cli::parse_from(["accord", "memory", "search", "tea"]);
        assert_eq!(
            cli.command,
            Some(Commands::Memory {
                cmd: MemoryCommand::Search {
                    term: "tea".to_string(),
                    file: "ALL".to_string()
                }
            })
        );
    }
}
