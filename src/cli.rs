use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tend")]
#[command(version)]
#[command(about = "Declarative machine setup: deps that check themselves and converge once", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Show engine internals (same as -vv)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file to use instead of ~/.config/tend/config.toml
    #[arg(long, global = true, env = "TEND_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check deps and meet the ones that aren't met
    Meet(MeetArgs),

    /// List loaded deps
    List(ListArgs),

    /// Show configured dep sources
    Sources,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct MeetArgs {
    /// Deps to meet (`name`, `source:name`, `name(arg, key=value)`), plus `KEY=VALUE` parameter values
    #[arg(required = true, value_name = "DEP|KEY=VALUE")]
    pub targets: Vec<String>,

    /// Only check met?, never change anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Re-run the named deps even if already resolved this run
    #[arg(short, long)]
    pub force: bool,

    /// Take parameter defaults instead of prompting
    #[arg(short = 'y', long)]
    pub defaults: bool,

    /// Number of root deps to resolve in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Only show deps whose name contains this
    pub filter: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_meet_flags() {
        let cli = Cli::parse_from(["tend", "meet", "ripgrep", "version=14", "-n", "-y", "-j", "4"]);
        let Command::Meet(args) = cli.command else {
            panic!("expected meet");
        };
        assert_eq!(args.targets, ["ripgrep", "version=14"]);
        assert!(args.dry_run);
        assert!(args.defaults);
        assert!(!args.force);
        assert_eq!(args.jobs, Some(4));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tend", "list", "git", "--debug", "-q"]);
        assert!(cli.debug);
        assert!(cli.quiet);
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.filter.as_deref(), Some("git"));
    }
}
