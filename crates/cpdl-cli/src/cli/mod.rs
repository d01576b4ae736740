//! CLI for the cpdl captive-portal download queue.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cpdl_core::config;
use std::path::PathBuf;

use commands::{run_config, run_get, GetOptions};

/// Top-level CLI for cpdl.
#[derive(Debug, Parser)]
#[command(name = "cpdl")]
#[command(about = "cpdl: sequential downloads over a captive-portal network", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URLs, one after another.
    Get {
        /// HTTP/HTTPS URLs to download, in order.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Directory to save into (default: current directory).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,

        /// MIME type of the downloads. Directly-open types are size limited.
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,

        /// User-Agent header (default: config value, then cpdl/<version>).
        #[arg(long)]
        user_agent: Option<String>,

        /// Bind connections to this network interface.
        #[arg(long)]
        interface: Option<String>,

        /// Comma-separated DNS servers of the portal network.
        #[arg(long, value_name = "ADDRS")]
        dns_servers: Option<String>,

        /// Print events as JSON lines instead of progress text.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and effective values.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                urls,
                dir,
                mime,
                user_agent,
                interface,
                dns_servers,
                json,
            } => {
                let dir = match dir {
                    Some(d) => d,
                    None => std::env::current_dir()?,
                };
                let opts = GetOptions {
                    urls,
                    dir,
                    mime,
                    user_agent,
                    interface,
                    dns_servers,
                    json,
                };
                run_get(&cfg, opts).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
