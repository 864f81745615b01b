//! CLI module for Shellcord
//!
//! Provides commands:
//! - `serve`: Run the Discord bot
//! - `host`: Manage the host directory
//! - `doctor`: Configuration diagnostics

use crate::server::config::AppConfig;
use clap::{Parser, Subcommand};

pub mod doctor;
pub mod host;

/// Shellcord CLI
#[derive(Parser, Debug)]
#[command(name = "shellcord")]
#[command(about = "Remote shell sessions over Discord")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bot
    Serve,
    /// Manage registered hosts
    #[command(subcommand)]
    Host(host::HostCommand),
    /// Check configuration and storage
    Doctor,
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run(config).await,
        Some(Commands::Host(command)) => host::run(command, &config).await,
        Some(Commands::Doctor) => doctor::run(&config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_host_add() {
        let cli = Cli::parse_from([
            "shellcord", "host", "add", "--owner", "42", "web1", "10.0.0.5", "--username",
            "deploy", "--password", "hunter2",
        ]);
        match cli.command {
            Some(Commands::Host(host::HostCommand::Add(args))) => {
                assert_eq!(args.hostname, "web1");
                assert_eq!(args.port, None);
                assert_eq!(args.password.as_deref(), Some("hunter2"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
