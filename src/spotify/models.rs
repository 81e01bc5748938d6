//! Spotify Web API response models and the domain types built from them

use serde::Deserialize;

/// One playable track, as seen by the download core
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Spotify track id
    pub id: String,
    pub name: String,
    /// All artist names joined with ", "
    pub artist: String,
    pub album: String,
    /// Release date at whatever precision Spotify has (`1997`, `1997-03`, `1997-03-12`)
    pub release_date: String,
    pub duration_ms: u64,
    pub track_number: u32,
    /// Artwork candidates, largest first
    pub artwork_urls: Vec<String>,
}

impl Track {
    /// Four-digit release year, if the release date starts with one
    pub fn year(&self) -> Option<u32> {
        let year = self.release_date.get(..4)?;
        if year.chars().all(|c| c.is_ascii_digit()) {
            year.parse().ok()
        } else {
            None
        }
    }
}

/// Playlist header information
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub total_tracks: u32,
}

// Raw API shapes

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAlbum {
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<ApiImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrack {
    /// Null for local files added to a playlist
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    pub album: ApiAlbum,
    pub duration_ms: u64,
    pub track_number: Option<u32>,
    #[serde(rename = "type", default = "default_item_type")]
    pub item_type: String,
}

fn default_item_type() -> String {
    "track".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOwner {
    pub display_name: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrackTotal {
    pub total: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPlaylist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner: ApiOwner,
    pub tracks: ApiTrackTotal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPlaylistItem {
    /// Null for removed/unavailable entries; episodes also appear here
    pub track: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl ApiTrack {
    /// Convert to the domain type, rejecting entries the core cannot use
    pub fn into_track(self) -> Option<Track> {
        if self.item_type != "track" {
            return None;
        }
        let id = self.id.filter(|id| !id.is_empty())?;

        let artist = self
            .artists
            .iter()
            .map(|a| a.name.trim())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        let name = self.name.trim().to_string();
        if artist.is_empty() || name.is_empty() {
            return None;
        }

        let mut images = self.album.images;
        images.sort_by_key(|img| {
            std::cmp::Reverse(u64::from(img.width.unwrap_or(0)) * u64::from(img.height.unwrap_or(0)))
        });

        Some(Track {
            id,
            name,
            artist,
            album: self.album.name,
            release_date: self.album.release_date.unwrap_or_default(),
            duration_ms: self.duration_ms,
            track_number: self.track_number.unwrap_or(1),
            artwork_urls: images.into_iter().map(|img| img.url).collect(),
        })
    }
}

impl From<ApiPlaylist> for Playlist {
    fn from(api: ApiPlaylist) -> Self {
        Self {
            id: api.id,
            name: api.name,
            description: api.description.filter(|d| !d.is_empty()),
            owner: api.owner.display_name.unwrap_or(api.owner.id),
            total_tracks: api.tracks.total,
        }
    }
}
