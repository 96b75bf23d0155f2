// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::Result;
use clap::Parser;
use sr_cli::{commands, CliConfig, Cli, Commands};
use std::io;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    cli.logging.or(config.logging.clone()).init("sr")?;

    match cli.command {
        Commands::Serve(args) => commands::serve(config, args).await,
        Commands::Inspect { export } => commands::inspect(&export, &mut io::stdout().lock()),
        Commands::Seek { export, at, replay } => {
            let replay = commands::replay_config(&config.replay, &replay, None);
            commands::seek(&export, at, replay, &mut io::stdout().lock())
        }
        Commands::Play {
            export,
            speed,
            tree,
            replay,
        } => {
            let replay = commands::replay_config(&config.replay, &replay, speed);
            commands::play(&export, replay, tree, io::stdout()).await?;
            Ok(())
        }
        Commands::Export { db, session, out } => {
            let events = commands::export(&db, &session, &out)?;
            println!("wrote {events} events to {}", out.display());
            Ok(())
        }
    }
}
