// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `sr`: serve the ingest API and replay recorded sessions from the terminal

pub mod commands;
pub mod config;

use clap::{Args, Parser, Subcommand};
use sr_domain_types::Size;
use sr_logging::CliLoggingArgs;
use std::net::SocketAddr;
use std::path::PathBuf;

pub use config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "sr", about = "Session Replay", version, propagate_version = true)]
pub struct Cli {
    /// TOML configuration file with [ingest], [replay] and [logging] tables
    #[arg(long, global = true, env = "SR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub logging: CliLoggingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the ingest HTTP server
    Serve(ServeArgs),
    /// Print session metadata and per-type event counts of an export file
    Inspect {
        export: PathBuf,
    },
    /// Render the reconstructed frame at one instant
    Seek {
        export: PathBuf,
        /// Milliseconds from the start of the session
        #[arg(long)]
        at: u64,
        #[command(flatten)]
        replay: ReplayArgs,
    },
    /// Play a session, rendering every frame as text
    Play {
        export: PathBuf,
        #[arg(long)]
        speed: Option<f64>,
        /// Print the document outline on every frame, not only when it changes
        #[arg(long)]
        tree: bool,
        #[command(flatten)]
        replay: ReplayArgs,
    },
    /// Dump a stored session into an export file
    Export {
        /// SQLite database written by `sr serve`
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        session: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Overrides `ingest.bind_addr`
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Overrides `ingest.database_path`
    #[arg(long)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ReplayArgs {
    /// Container size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    pub container: Option<Size>,
    /// Upper bound on the content scale
    #[arg(long)]
    pub scale: Option<f64>,
}

fn parse_size(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value}"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u32>()
            .map_err(|err| format!("invalid dimension {part:?}: {err}"))
    };
    Ok(Size::new(parse(width)?, parse(height)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_arguments_parse() {
        let cli = Cli::try_parse_from([
            "sr",
            "--log-level",
            "debug",
            "seek",
            "session.json",
            "--at",
            "2000",
            "--container",
            "800x600",
        ])
        .unwrap();

        assert_eq!(cli.logging.log_level, Some(sr_logging::CliLogLevel::Debug));
        match cli.command {
            Commands::Seek { export, at, replay } => {
                assert_eq!(export, PathBuf::from("session.json"));
                assert_eq!(at, 2000);
                assert_eq!(replay.container, Some(Size::new(800, 600)));
                assert_eq!(replay.scale, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn export_requires_all_three_flags() {
        assert!(Cli::try_parse_from(["sr", "export", "--db", "a.db", "--session", "s1"]).is_err());
        assert!(Cli::try_parse_from([
            "sr", "export", "--db", "a.db", "--session", "s1", "--out", "s1.json"
        ])
        .is_ok());
    }

    #[test]
    fn container_size_validation() {
        assert_eq!(parse_size("1280x720"), Ok(Size::new(1280, 720)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("wide x 720").is_err());
    }
}
