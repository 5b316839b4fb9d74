//! Command-line interface definitions using clap.

use crate::logging::LogFormat;
use clap::{Parser, Subcommand};
use serde_json::Value;

/// Run a registered function in an isolated, short-lived worker process.
#[derive(Parser, Debug)]
#[command(name = "forkcall")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Log format: pretty, compact or json.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Call a target in a fresh worker and print its result as JSON.
    Call(CallArgs),

    /// List the targets this binary can run.
    Targets,
}

/// Arguments for the call command.
#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Name of the target to call.
    pub target: String,

    /// Arguments, each parsed as JSON or taken as a plain string.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Pretty-print the result.
    #[arg(short, long)]
    pub pretty: bool,
}

impl CallArgs {
    /// Arguments converted to JSON values.
    pub fn values(&self) -> Vec<Value> {
        self.args.iter().map(|arg| parse_arg(arg)).collect()
    }
}

/// Parse a command-line argument as JSON, falling back to a string.
///
/// `3` becomes a number and `[1,2]` an array, while `hello` stays the string
/// `"hello"`.
pub fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

/// Verbosity level for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// -q: errors only.
    Quiet,
    /// Default: warnings and errors.
    Normal,
    /// -v: worker lifecycle.
    Info,
    /// -vv: spawn and settle details.
    Debug,
    /// -vvv: every protocol message.
    Trace,
}

impl From<u8> for Verbosity {
    fn from(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Info,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }
}

impl Verbosity {
    /// Log filter implied by this verbosity, if it differs from the default.
    pub fn log_filter(self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet => Some("error"),
            Verbosity::Normal => None,
            Verbosity::Info => Some("forkcall=info"),
            Verbosity::Debug => Some("forkcall=debug"),
            Verbosity::Trace => Some("forkcall=trace"),
        }
    }
}

impl Cli {
    /// Get the verbosity level based on -v and -q flags.
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::from(self.verbose)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_parsing() {
        // Verify the CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_call_command() {
        let cli = Cli::try_parse_from(["forkcall", "call", "sum", "1", "2", "3"]).unwrap();
        match cli.command {
            Commands::Call(call) => {
                assert_eq!(call.target, "sum");
                assert_eq!(call.values(), vec![json!(1), json!(2), json!(3)]);
                assert!(!call.pretty);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_call_accepts_negative_numbers() {
        let cli = Cli::try_parse_from(["forkcall", "call", "sum", "-4", "1"]).unwrap();
        match cli.command {
            Commands::Call(call) => assert_eq!(call.values(), vec![json!(-4), json!(1)]),
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_call_without_arguments() {
        let cli = Cli::try_parse_from(["forkcall", "call", "--pretty", "echo"]).unwrap();
        match cli.command {
            Commands::Call(call) => {
                assert!(call.pretty);
                assert!(call.values().is_empty());
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_targets_command() {
        let cli = Cli::try_parse_from(["forkcall", "targets"]).unwrap();
        assert!(matches!(cli.command, Commands::Targets));
    }

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("42"), json!(42));
        assert_eq!(parse_arg("1.5"), json!(1.5));
        assert_eq!(parse_arg("true"), json!(true));
        assert_eq!(parse_arg("null"), Value::Null);
        assert_eq!(parse_arg(r#"{"a":[1]}"#), json!({"a": [1]}));
        assert_eq!(parse_arg(r#""quoted""#), json!("quoted"));
        assert_eq!(parse_arg("hello"), json!("hello"));
        assert_eq!(parse_arg("{broken"), json!("{broken"));
    }

    #[test]
    fn test_global_options() {
        let cli =
            Cli::try_parse_from(["forkcall", "-vv", "--no-color", "--log-format", "json", "targets"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_color);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.verbosity(), Verbosity::Debug);
    }

    #[test]
    fn test_invalid_log_format() {
        assert!(Cli::try_parse_from(["forkcall", "--log-format", "xml", "targets"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["forkcall", "-v", "-q", "targets"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verbosity_filters() {
        assert_eq!(Verbosity::Quiet.log_filter(), Some("error"));
        assert_eq!(Verbosity::Normal.log_filter(), None);
        assert_eq!(Verbosity::from(7).log_filter(), Some("forkcall=trace"));
    }
}
