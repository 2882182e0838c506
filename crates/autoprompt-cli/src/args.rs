//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Answer interactive prompts of a program running in a terminal.
///
/// Runs the command in a pseudo-terminal, mirrors its screen, and sends
/// keystrokes when a known prompt appears. You can keep typing as usual;
/// prompts that are not accepted are left for you to answer.
#[derive(Debug, Parser)]
#[command(name = "autoprompt", version)]
pub struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command and answer its prompts
    #[command(after_help = "\
Examples:
  autoprompt run -- claude                          # Watch only, answer nothing
  autoprompt run --accept edit-file -- claude       # Auto-accept file edits
  autoprompt run --accept-all -- claude             # Accept every prompt with a response
  autoprompt run --patterns npm.json -- npm init    # Use custom patterns
  autoprompt run --set accept_edits_for_session=true --accept edit-file -- claude")]
    Run(RunArgs),

    /// List registered patterns
    Patterns(PatternsArgs),

    /// Validate a pattern file
    Check(CheckArgs),
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// JSON pattern file [default: <config dir>/autoprompt/patterns.json if present]
    #[arg(short, long, value_name = "FILE")]
    pub patterns: Option<PathBuf>,

    /// Pattern id to answer automatically (repeatable)
    #[arg(short, long = "accept", value_name = "ID")]
    pub accept: Vec<String>,

    /// Answer every prompt that has a response
    #[arg(long)]
    pub accept_all: bool,

    /// Do not register the built-in patterns
    #[arg(long)]
    pub no_builtin: bool,

    /// Quiet time after a trigger before matching, in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Text shown by the program while it is busy (empty disables)
    #[arg(long, value_name = "TEXT")]
    pub indicator: Option<String>,

    /// Variable visible to computed responses (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Command to run, with its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Debug, clap::Args)]
pub struct PatternsArgs {
    /// JSON pattern file to include
    #[arg(short, long, value_name = "FILE")]
    pub patterns: Option<PathBuf>,

    /// Leave out the built-in patterns
    #[arg(long)]
    pub no_builtin: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// JSON pattern file to validate
    #[arg(short, long, value_name = "FILE")]
    pub patterns: PathBuf,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err("variable name must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parses_trailing_command() {
        let cli = Cli::try_parse_from([
            "autoprompt",
            "run",
            "--accept",
            "edit-file",
            "-a",
            "bash-command",
            "--",
            "claude",
            "--model",
            "opus",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.accept, vec!["edit-file", "bash-command"]);
                assert_eq!(args.command, vec!["claude", "--model", "opus"]);
                assert!(!args.accept_all);
                assert!(args.settle_ms.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["autoprompt", "run"]).is_err());
    }

    #[test]
    fn test_run_vars() {
        let cli = Cli::try_parse_from([
            "autoprompt",
            "run",
            "--set",
            "accept_edits_for_session=true",
            "--",
            "claude",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => assert_eq!(
                args.vars,
                vec![(
                    "accept_edits_for_session".to_string(),
                    "true".to_string()
                )]
            ),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_var_rejects_missing_equals() {
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
        assert_eq!(
            parse_var("k=a=b").unwrap(),
            ("k".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn test_global_log_file() {
        let cli = Cli::try_parse_from([
            "autoprompt",
            "check",
            "--patterns",
            "p.json",
            "--log-file",
            "/tmp/ap.log",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/ap.log")));
        assert!(matches!(cli.command, Commands::Check(_)));
    }
}
