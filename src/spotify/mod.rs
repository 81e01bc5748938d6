//! Spotify Web API client module

pub mod auth;
pub mod client;
pub mod link;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;

pub use auth::SpotifyCredentials;
pub use client::SpotifyClient;
pub use link::{LinkKind, SpotifyLink};
pub use models::{Playlist, Track};

/// Track and playlist metadata lookups
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn get_track(&self, id: &str) -> Result<Track>;

    async fn get_playlist(&self, id: &str) -> Result<Playlist>;

    /// Every usable track of the playlist, in playlist order, without duplicates
    async fn get_playlist_tracks(&self, id: &str) -> Result<Vec<Track>>;
}
