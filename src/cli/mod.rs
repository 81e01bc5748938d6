//! CLI module for spotgrab

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::extract::{AudioFormat, AudioQuality};

pub mod auth;
pub mod commands;

pub use auth::AuthManager;

#[derive(Parser, Debug)]
#[command(name = "spotgrab", about = "Download Spotify tracks and playlists as local audio")]
#[command(version, author)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store Spotify application credentials
    Auth {
        /// Spotify client id
        #[arg(long, env = "SPOTIFY_CLIENT_ID")]
        client_id: Option<String>,

        /// Spotify client secret
        #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,

        /// Replace stored credentials
        #[arg(long)]
        force: bool,
    },

    /// Download a Spotify track or playlist, or a YouTube / SoundCloud link
    Download {
        /// Spotify track or playlist link (https://open.spotify.com/... or spotify:...),
        /// or a YouTube video / SoundCloud track link
        #[arg(value_name = "URL")]
        url: String,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Audio format (overrides config)
        #[arg(long, value_enum)]
        format: Option<AudioFormat>,

        /// Audio quality (overrides config)
        #[arg(long, value_enum)]
        quality: Option<AudioQuality>,

        /// Number of parallel downloads (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Show saved progress for a playlist
    Status {
        /// Playlist link or id
        #[arg(value_name = "PLAYLIST")]
        playlist: String,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the current settings
    Show,

    /// Change and save settings
    Set {
        /// Default output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<AudioFormat>,

        #[arg(long, value_enum)]
        quality: Option<AudioQuality>,

        /// Default number of parallel downloads
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::parse_from([
            "spotgrab",
            "download",
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M",
            "--format",
            "flac",
            "-w",
            "4",
        ]);
        match cli.command {
            Commands::Download {
                format, workers, quality, ..
            } => {
                assert_eq!(format, Some(AudioFormat::Flac));
                assert_eq!(workers, Some(4));
                assert_eq!(quality, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
