//! CLI for the RML remote module loader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rml_core::config::{self, RmlConfig};
use rml_core::fetch::{FetchOptions, FetchQueue};
use rml_core::loader::LoaderOptions;
use std::time::Duration;

use commands::{run_fetch, run_manifest, run_module, run_resolve, run_satisfies};

/// Top-level CLI for the RML remote module loader.
#[derive(Debug, Parser)]
#[command(name = "rml")]
#[command(about = "RML: fetch, decode, and execute remote modules", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch a URL through the ordered queue and print the response text.
    Fetch {
        /// HTTP/HTTPS URL to fetch.
        url: String,

        /// Watchdog timeout in milliseconds (config default when omitted).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Append a cache-busting query parameter.
        #[arg(long)]
        nocache: bool,
    },

    /// Fetch and decode a host's manifest.json, printing it as JSON.
    Manifest {
        /// Host directory URL, or any script URL inside it.
        host: String,

        /// Fail unless the manifest's version satisfies this range.
        #[arg(long, value_name = "RANGE")]
        required_version: Option<String>,

        /// Watchdog timeout in milliseconds (config default when omitted).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Append a cache-busting query parameter.
        #[arg(long)]
        nocache: bool,
    },

    /// Fetch and execute a module, printing its exports as JSON.
    Run {
        /// Module URL.
        url: String,

        /// Watchdog timeout in milliseconds (config default when omitted).
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Append a cache-busting query parameter.
        #[arg(long)]
        nocache: bool,
    },

    /// Resolve a module path against a host or the configured base URL.
    Resolve {
        /// Module path, e.g. `./entry.js`.
        path: String,

        /// Host to resolve against (overrides the configured base URL).
        #[arg(long)]
        host: Option<String>,
    },

    /// Check a version against a range, printing true or false.
    Satisfies {
        /// Version string, e.g. `1.2.3`.
        version: String,

        /// Range, e.g. `^1.2 || >=2 <3`.
        range: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let queue = FetchQueue::new();

        match cli.command {
            CliCommand::Fetch {
                url,
                timeout_ms,
                nocache,
            } => run_fetch(&queue, &url, fetch_options(&cfg, timeout_ms, nocache)).await?,
            CliCommand::Manifest {
                host,
                required_version,
                timeout_ms,
                nocache,
            } => {
                let fetch = fetch_options(&cfg, timeout_ms, nocache);
                let options = LoaderOptions {
                    timeout: fetch.timeout,
                    nocache: fetch.nocache,
                    required_version,
                    ..LoaderOptions::default()
                };
                run_manifest(queue, &host, options).await?;
            }
            CliCommand::Run {
                url,
                timeout_ms,
                nocache,
            } => run_module(&queue, &url, fetch_options(&cfg, timeout_ms, nocache)).await?,
            CliCommand::Resolve { path, host } => {
                run_resolve(&cfg, &path, host.as_deref()).await?
            }
            CliCommand::Satisfies { version, range } => run_satisfies(&version, &range).await?,
        }

        Ok(())
    }
}

/// Flags override the config file; `nocache` is on when either asks for it.
fn fetch_options(cfg: &RmlConfig, timeout_ms: Option<u64>, nocache: bool) -> FetchOptions {
    FetchOptions {
        timeout: Some(
            timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| cfg.timeout()),
        ),
        sync: false,
        nocache: nocache || cfg.nocache,
    }
}
