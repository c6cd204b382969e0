//! CLI command definitions and handlers

pub mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// repo-relay - REST relay between git repositories and a coding assistant
#[derive(Parser, Debug)]
#[command(name = "repo-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true, value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "REPO_RELAY_PORT", default_value = "3000")]
    pub port: u16,

    /// Hostname to bind to
    #[arg(long, env = "REPO_RELAY_HOSTNAME", default_value = "0.0.0.0")]
    pub hostname: String,

    /// Directory holding cloned repositories (overrides config)
    #[arg(long)]
    pub repos_root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Print the effective configuration
    #[arg(long)]
    pub show: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["repo-relay", "serve"]).unwrap();
        match cli.command {
            Command::Serve(args) => {
                assert_eq!(args.hostname, "0.0.0.0");
                assert!(args.repos_root.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_log_level_after_subcommand() {
        let cli = Cli::try_parse_from([
            "repo-relay",
            "serve",
            "--repos-root",
            "/srv/repos",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(Cli::try_parse_from(["repo-relay", "--log-level", "loud", "serve"]).is_err());
    }
}
