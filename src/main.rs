//! udp-repeater: configurable UDP packet repeater daemon
//!
//! This is the main entry point for the production daemon.
//!
//! # Usage
//!
//! ```bash
//! # Run with a rules file and log file
//! udp-repeater rules.json repeater.log
//!
//! # Stay in the foreground (no fork, log to the terminal)
//! udp-repeater -f rules.json repeater.log
//!
//! # Validate the rules file and exit
//! udp-repeater --check rules.json repeater.log
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use udp_repeater::config::load_rules;
use udp_repeater::daemon::{daemonize, Forked};
use udp_repeater::error::{ConfigError, RepeaterError};
use udp_repeater::registry::{verify, Registry};
use udp_repeater::relay::Engine;

/// Command-line arguments
struct Args {
    /// Rules file path
    rules_path: PathBuf,
    /// Log file path
    log_path: PathBuf,
    /// Stay in the foreground instead of daemonizing
    foreground: bool,
    /// Validate the rules file and exit
    check: bool,
}

impl Args {
    fn parse() -> Self {
        let mut positional: Vec<PathBuf> = Vec::new();
        let mut foreground = false;
        let mut check = false;

        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "-f" | "--foreground" => foreground = true,
                "--check" => check = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("udp-repeater v{}", udp_repeater::VERSION);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown argument: {other}");
                    print_help();
                    std::process::exit(1);
                }
                other => positional.push(PathBuf::from(other)),
            }
        }

        if positional.len() != 2 {
            eprintln!("USAGE: udp-repeater rules.json repeater.log");
            std::process::exit(1);
        }

        let log_path = positional.pop().expect("two positionals");
        let rules_path = positional.pop().expect("two positionals");

        Self {
            rules_path,
            log_path,
            foreground,
            check,
        }
    }
}

fn print_help() {
    println!(
        r"udp-repeater v{}

Configurable UDP packet repeater daemon.

USAGE:
    udp-repeater [OPTIONS] <rules.json> <repeater.log>

ARGS:
    <rules.json>     Forwarding rules file
    <repeater.log>   Log file (append mode, created if missing)

OPTIONS:
    -f, --foreground   Do not fork; log to the terminal
    --check            Validate the rules file and exit
    -h, --help         Print help information
    -v, --version      Print version information

ENVIRONMENT:
    RUST_LOG           Override log level (trace, debug, info, warn, error)

The daemon forks into the background after the rules pass validation; the
parent exits 0. Per-packet diagnostics are logged at debug level.
",
        udp_repeater::VERSION
    );
}

/// Initialize logging
///
/// `RUST_LOG` takes precedence; the default level is `info`. The subscriber
/// writes to stderr at event time, so output follows the daemonizer's
/// redirection into the log file.
fn init_logging() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Report a fatal setup error, one diagnostic line per root cause
fn report_fatal(err: &RepeaterError) {
    if let RepeaterError::Config(ConfigError::Rejected { errors }) = err {
        for line in errors {
            error!("CONFIG: {}", line);
        }
    }
    error!("{}", err);
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging();

    // Load rules and populate the registry; both are fatal on any error.
    let rules = match load_rules(&args.rules_path) {
        Ok(rules) => rules,
        Err(e) => {
            report_fatal(&e.into());
            return ExitCode::FAILURE;
        }
    };

    let registry = match Registry::from_rules(&rules) {
        Ok(registry) => registry,
        Err(e) => {
            report_fatal(&e.into());
            return ExitCode::FAILURE;
        }
    };

    registry.debug_dump();

    // Cross-reference check; every violation has already been logged.
    if let Err(e) = verify(&registry) {
        error!("{}", e);
        error!("ERROR (Fatal): Config verification failed, repeater has not been started");
        return ExitCode::FAILURE;
    }

    if args.check {
        println!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    // Daemonize before the runtime exists; the parent's job is done.
    if !args.foreground {
        match daemonize(&args.log_path) {
            Ok(Forked::Parent) => return ExitCode::SUCCESS,
            Ok(Forked::Child) => info!("Repeater started"),
            Err(e) => {
                report_fatal(&e);
                return ExitCode::FAILURE;
            }
        }
    }

    // Single-threaded by design: one runtime thread, one suspension point.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            report_fatal(&e.into());
            return ExitCode::FAILURE;
        }
    };

    let result: udp_repeater::Result<()> = runtime.block_on(async {
        let engine = Engine::new(registry)?;
        engine.run().await?;
        Ok(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_fatal(&e);
            ExitCode::FAILURE
        }
    }
}
