//! CLI for the refetch HTTP engine.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use refetch_core::config::{self, RefetchConfig};
use refetch_core::decode::OutputKind;
use refetch_core::retry::BackoffKind;
use std::path::PathBuf;

use commands::{run_config, run_request, Verb};

/// Top-level CLI for refetch.
#[derive(Debug, Parser)]
#[command(name = "refetch")]
#[command(about = "refetch: HTTP requests with retries, backoff and Retry-After", long_about = None)]
pub struct Cli {
    /// Use this config file instead of ~/.config/refetch/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Send a GET request.
    Get {
        /// Endpoint, joined to the base URL (absolute URLs are used as is).
        endpoint: String,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// Send a DELETE request.
    Delete {
        endpoint: String,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// Send a POST request with an optional JSON body.
    Post {
        endpoint: String,
        /// JSON request body.
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// Send a PUT request with an optional JSON body.
    Put {
        endpoint: String,
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// Send a PATCH request with an optional JSON body.
    Patch {
        endpoint: String,
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
        #[command(flatten)]
        opts: RequestOpts,
    },

    /// Print the config path and the effective configuration.
    Config,
}

/// Per-invocation overrides of the loaded config.
#[derive(Debug, Clone, Default, Args)]
pub struct RequestOpts {
    /// Base URL for relative endpoints.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Output kind: json, text, bytes, blob, formdata or response.
    #[arg(long = "as", value_name = "KIND", default_value_t = OutputKind::Json)]
    pub output: OutputKind,

    /// Extra header, "Name: value". Repeatable.
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Attempts including the first.
    #[arg(long, value_name = "N")]
    pub attempts: Option<u32>,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Backoff kind: linear or exponential. Enables backoff if the config has none.
    #[arg(long, value_name = "KIND")]
    pub backoff: Option<BackoffKind>,

    #[arg(long, value_name = "MS")]
    pub min_delay_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub max_delay_ms: Option<u64>,

    /// Disable backoff jitter.
    #[arg(long)]
    pub no_jitter: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<RefetchConfig> {
    match path {
        Some(p) => config::load_from(p),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = load_config(cli.config.as_ref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get { endpoint, opts } => {
                run_request(cfg, Verb::Get, &endpoint, None, &opts).await?
            }
            CliCommand::Delete { endpoint, opts } => {
                run_request(cfg, Verb::Delete, &endpoint, None, &opts).await?
            }
            CliCommand::Post { endpoint, body, opts } => {
                run_request(cfg, Verb::Post, &endpoint, body.as_deref(), &opts).await?
            }
            CliCommand::Put { endpoint, body, opts } => {
                run_request(cfg, Verb::Put, &endpoint, body.as_deref(), &opts).await?
            }
            CliCommand::Patch { endpoint, body, opts } => {
                run_request(cfg, Verb::Patch, &endpoint, body.as_deref(), &opts).await?
            }
            CliCommand::Config => run_config(cli.config.as_deref(), &cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
