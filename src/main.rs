//! spotgrab - Download Spotify tracks and playlists via YouTube

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod error;
mod extract;
mod resolve;
mod spotify;
mod sync;
mod tagging;
mod utils;

#[cfg(test)]
mod test_http;

use cli::commands::DownloadOverrides;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "spotgrab=debug,reqwest=debug"
    } else {
        "spotgrab=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Auth {
            client_id,
            client_secret,
            force,
        } => {
            cli::commands::auth(client_id, client_secret, force).await?;
        }
        Commands::Download {
            url,
            output,
            format,
            quality,
            workers,
        } => {
            let overrides = DownloadOverrides {
                output,
                format,
                quality,
                workers,
            };
            cli::commands::download(url, overrides).await?;
        }
        Commands::Status { playlist } => {
            cli::commands::status(playlist).await?;
        }
        Commands::Config { action } => {
            cli::commands::config(action)?;
        }
        Commands::Completion { shell } => {
            cli::commands::completion(shell);
        }
    }

    Ok(())
}
