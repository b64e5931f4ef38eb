// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapline - a messaging gateway for long-lived transport sessions.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod jobs;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use zapline_config::ZaplineConfig;

/// Zapline - keeps messaging sessions alive and delivers scheduled messages.
#[derive(Parser, Debug)]
#[command(name = "zapline", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway, dispatcher and sessions until interrupted.
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
    /// Inspect scheduled jobs.
    Jobs {
        #[command(subcommand)]
        action: JobsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum JobsCommand {
    /// List recent jobs, newest first.
    List {
        /// Only jobs in this state (queued, processing, sent, failed).
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of jobs to show.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> ZaplineConfig {
    let loaded = match path {
        Some(path) => zapline_config::load_and_validate_path(path),
        None => zapline_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            zapline_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::CheckConfig) => {
            println!(
                "zapline: config OK (gateway {}:{}, database {}, bridge {})",
                config.gateway.host,
                config.gateway.port,
                config.storage.database_path,
                config.bridge.base_url
            );
            if config.gateway.enabled && config.gateway.bearer_token.is_none() {
                eprintln!("warning: gateway.bearer_token is not set, every /v1 request will be rejected");
            }
            Ok(())
        }
        Some(Commands::Jobs {
            action: JobsCommand::List { status, limit },
        }) => jobs::run_list(&config, status.as_deref(), limit).await,
        None => {
            println!("zapline: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        // Only jemalloc supports advancing the epoch.
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn jobs_list_parses_filters() {
        let cli = Cli::parse_from(["zapline", "jobs", "list", "--status", "failed", "--limit", "5"]);
        match cli.command {
            Some(Commands::Jobs {
                action: JobsCommand::List { status, limit },
            }) => {
                assert_eq!(status.as_deref(), Some("failed"));
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["zapline", "check-config", "--config", "/tmp/z.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/z.toml")));
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = zapline_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.service.name, "zapline");
    }
}
