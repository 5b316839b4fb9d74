//! forkcall - call a function in a fresh worker process

use anyhow::Result;
use clap::Parser;
use forkcall::cli::{CallArgs, Cli, Commands};
use forkcall::logging::{self, LogConfig};
use forkcall::{Argument, Invoker, WorkerConfig, demo};
use owo_colors::{OwoColorize, Stream::Stderr, Stream::Stdout};
use tracing::Level;

/// Program entry point.
///
/// Workers are dispatched before anything else touches stdin or stdout;
/// otherwise the CLI is parsed and the selected command run. On error, a
/// colored header and the error chain go to stderr and the exit code is 1.
fn main() {
    if forkcall::is_worker_process() {
        forkcall::run_worker_main(demo::registry());
    }

    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    init_logging(&cli);

    let result = match &cli.command {
        Commands::Call(args) => cmd_call(&cli, args),
        Commands::Targets => cmd_targets(),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let mut config = LogConfig::default()
        .with_level(Level::WARN)
        .with_ansi(!cli.no_color);
    if let Some(filter) = cli.verbosity().log_filter() {
        config = config.with_filter(filter.to_string());
    }
    config = config.with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    logging::init_with_file(config);
}

/// Worker configuration with the CLI's logging choices passed down.
fn worker_config(cli: &Cli) -> WorkerConfig {
    let mut config = WorkerConfig::default().with_env_overrides();
    if let Some(filter) = cli.verbosity().log_filter() {
        config = config.with_env("FORKCALL_LOG", filter);
    }
    if let Some(format) = cli.log_format {
        config = config.with_env("FORKCALL_LOG_FORMAT", format.to_string());
    }
    config
}

fn cmd_call(cli: &Cli, args: &CallArgs) -> Result<()> {
    let invoker = Invoker::with_config(demo::registry(), worker_config(cli));
    let remote = invoker.bind(&args.target)?;

    let arguments = args.values().into_iter().map(Argument::from).collect();
    let handle = remote.call(arguments)?;
    tracing::info!(pid = handle.pid(), function = %args.target, "Worker started");

    let value = handle.wait()?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{}", output);
    Ok(())
}

fn cmd_targets() -> Result<()> {
    let registry = demo::registry();
    for name in registry.names() {
        let kind = match registry.get(name) {
            Some(target) if target.is_async() => "async",
            _ => "sync",
        };
        println!(
            "{}  {}",
            name,
            kind.if_supports_color(Stdout, |text| text.dimmed())
        );
    }
    Ok(())
}
