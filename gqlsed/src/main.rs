mod config;
mod errors;
mod schema;

use std::path::PathBuf;

use async_signal::{Signal, Signals};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use graphql_sse_api::{server::GraphQLRoutes, start_server};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use validator::Validate;

use crate::{config::Config, errors::ConfigError};

/// gqlsed: Daemon serving an example GraphQL schema with subscriptions over Server-Sent Events
#[derive(Debug, Parser)]
#[command(
    name = "gqlsed",
    about = "Daemon serving an example GraphQL schema with subscriptions over Server-Sent Events"
)]
struct Args {
    /// Increase output verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optional path to a configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the GraphQL schema in SDL and exit
    ExportSchema {
        /// Write to this file instead of stdout
        #[arg(short = 'o', long = "output", value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

impl Args {
    /// Loads the configuration file specified by `config` command line argument.
    ///
    /// If no configuration file is specified,
    /// the default configuration is loaded if `use_default` is set.
    pub fn load_config(&self, use_default: bool) -> errors::Result<Config> {
        if use_default && self.config.is_none() {
            warn!("no configuration file specified; using default configuration");
            return Ok(Config::default());
        }

        let config: Config = serde_yaml::from_reader(std::fs::File::open(
            self.config.as_ref().ok_or(ConfigError::NoConfiguration)?,
        )?)
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn export_schema(output: Option<&PathBuf>) -> errors::Result<()> {
    let sdl = schema::export_schema_sdl();
    match output {
        Some(path) => {
            std::fs::write(path, sdl)?;
            info!(path = %path.display(), "schema exported");
        }
        None => print!("{sdl}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> errors::Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber. Precedence: RUST_LOG env > -v flag > default info
    let env_filter = if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        EnvFilter::from_default_env()
    } else {
        match args.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    if let Some(Command::ExportSchema { output }) = &args.command {
        return export_schema(output.as_ref());
    }

    info!(
        verbosity = args.verbose,
        config = args.config.as_ref().map(|p| p.display().to_string()).as_deref(),
        "gqlsed starting"
    );

    let mut config = args.load_config(true)?;

    let shutdown = CancellationToken::new();
    let routes = GraphQLRoutes::new(schema::build_schema(&config.demo))
        .context_builder(schema::request_context)
        .shutdown_token(shutdown.clone());
    let mut server = tokio::spawn(start_server(routes, config.api.clone()));

    info!("daemon running; send SIGHUP to reload config, SIGINT/SIGTERM to stop");

    let mut signals = Signals::new([Signal::Hup, Signal::Int, Signal::Term])?;
    loop {
        tokio::select! {
            signal = signals.try_next() => match signal? {
                Some(Signal::Hup) => {
                    info!("received SIGHUP; reloading configuration");
                    match args.load_config(false) {
                        Ok(new_cfg) => {
                            if new_cfg.api.bind_address != config.api.bind_address
                                || new_cfg.api.path_prefix != config.api.path_prefix
                                || new_cfg.demo != config.demo
                            {
                                warn!("Configuration reloaded, but the server continues with original settings");
                            } else {
                                info!("Configuration reloaded; no changes");
                            }
                            config = new_cfg;
                        }
                        Err(error) => error!(%error, "failed to reload configuration"),
                    }
                }
                Some(Signal::Int | Signal::Term) | None => {
                    info!("received SIGINT/SIGTERM; shutting down");
                    break;
                }
                Some(_) => {
                    warn!("received unknown signal; ignoring");
                }
            },
            result = &mut server => {
                // The server only returns on its own when it failed to start or serve
                result??;
                return Ok(());
            }
        }
    }

    // Ends open subscription streams and stops accepting connections
    shutdown.cancel();
    server.await??;

    info!("gqlsed stopped gracefully");
    Ok(())
}
