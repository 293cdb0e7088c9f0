//! `lstn`: analyze the behavior of your dependencies using listen.dev.

mod ci;
mod cli;
mod commands;
mod config;
mod error;
mod jq;
mod listen;
mod pipeline;
mod report;
mod reporter;
mod status;
mod validate;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{CiCommands, Cli, Commands};
use commands::Session;
use config::{ConfigSource, DEFAULT_LOGLEVEL, Env, ProcessEnv, env_name};
use error::CliError;
use status::Status;

/// Logs go to stderr; stdout carries verdicts and JSON.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOGLEVEL));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
}

fn print_topic(text: String) {
    print!("{text}");
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Commands::Version {
            verbosity,
            changelog,
        } => {
            let version = lstn_http::ToolVersion::current();
            println!("{}", commands::version::render(&version, *verbosity, *changelog));
            return Ok(());
        }
        Commands::Config => {
            print_topic(commands::topics::config());
            return Ok(());
        }
        Commands::Environment => {
            print_topic(commands::topics::environment());
            return Ok(());
        }
        Commands::Exit => {
            print_topic(commands::topics::exit());
            return Ok(());
        }
        Commands::Manual => {
            print_topic(commands::topics::manual());
            return Ok(());
        }
        Commands::Reporters => {
            print_topic(commands::topics::reporters());
            return Ok(());
        }
        _ => {}
    }

    if let Commands::To { args, .. } = &cli.command
        && !cli.global.debug_options
    {
        commands::to::check_arg_count(args)?;
    }

    let env = ProcessEnv;
    let cwd = std::env::current_dir()?;
    let home = dirs::home_dir();
    let source = ConfigSource::discover(cli.global.config.as_deref(), &cwd, home.as_deref())?;

    let level = cli
        .global
        .loglevel
        .clone()
        .or_else(|| env.var(&env_name("loglevel")))
        .or_else(|| source.loglevel().map(ToString::to_string))
        .unwrap_or_else(|| DEFAULT_LOGLEVEL.to_string());
    init_tracing(&level);
    eprintln!("{}", source.announcement());

    let ci = match ci::detect(&env) {
        Ok(info) => info,
        Err(error) => {
            tracing::debug!(%error, "running without CI information");
            None
        }
    };

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupted");
            interrupt.cancel();
        }
    });

    let session = Session {
        source: &source,
        env: &env,
        ci: ci.as_ref(),
        token,
        status: Status::stderr(),
    };
    let flags = cli.flag_values();

    match &cli.command {
        Commands::In { path, .. } => commands::lockfiles::run(&session, &flags, path.as_deref()).await,
        Commands::Scan { path, .. } => commands::scan::run(&session, &flags, path.as_deref()).await,
        Commands::To { args, .. } => commands::to::run(&session, &flags, args).await,
        Commands::Ci {
            command: CiCommands::Enable { .. },
        } => commands::ci::enable(&session, &flags).await,
        Commands::Ci {
            command: CiCommands::Report { .. },
        } => commands::ci::report(&session, &flags).await,
        Commands::Version { .. }
        | Commands::Config
        | Commands::Environment
        | Commands::Exit
        | Commands::Manual
        | Commands::Reporters => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(error) = run(cli).await {
        match &error {
            CliError::Halt { value, output, .. } => {
                print!("{output}");
                if let Some(value) = value {
                    eprint!("{value}");
                }
            }
            _ => eprintln!("Error: {error}"),
        }
        std::process::exit(error.exit_code());
    }
}
