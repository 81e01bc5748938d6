//! Spotify Web API HTTP client

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::MetadataService;
use super::auth::{AccessToken, SpotifyCredentials, TOKEN_URL, request_token};
use super::models::*;

pub const API_BASE: &str = "https://api.spotify.com/v1";

/// Page size for playlist items (Spotify's maximum)
const PLAYLIST_PAGE_LIMIT: u32 = 100;

/// Longest `Retry-After` we are willing to wait out
const MAX_RETRY_AFTER_SECS: u64 = 120;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP client for the Spotify Web API
pub struct SpotifyClient {
    api_base: String,
    token_url: String,
    credentials: SpotifyCredentials,
    http_client: Client,
    token: Mutex<Option<AccessToken>>,
    max_retries: u32,
    backoff: Duration,
}

impl SpotifyClient {
    /// Create a new Spotify client
    pub fn new(credentials: SpotifyCredentials) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("spotgrab/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(http_client, credentials))
    }

    pub fn with_client(http_client: Client, credentials: SpotifyCredentials) -> Self {
        Self {
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            credentials,
            http_client,
            token: Mutex::new(None),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(500),
        }
    }

    /// Retry rate-limited (429) and server-error (5xx) responses up to `max_retries` times
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay before retrying a server error; doubles on each attempt
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Point the client at different API and token endpoints
    pub fn with_endpoints(mut self, api_base: &str, token_url: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.token_url = token_url.to_string();
        self
    }

    /// Check the credentials by performing a token exchange
    pub async fn verify(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }

    /// Current bearer token, refreshed when close to expiry
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = request_token(&self.http_client, &self.token_url, &self.credentials).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        let response = loop {
            let token = self.access_token().await?;
            debug!("GET {}", url);

            let response = self
                .http_client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .context("Failed to connect to Spotify API")?;

            let status = response.status();
            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || attempt >= self.max_retries {
                break response;
            }

            let Some(delay) = self.retry_delay(&response, attempt) else {
                break response;
            };
            attempt += 1;
            warn!(
                "Spotify returned {}, retrying in {:?} ({}/{})",
                status, delay, attempt, self.max_retries
            );
            tokio::time::sleep(delay).await;
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&body) {
                anyhow::bail!("Spotify error {}: {}", error.error.status, error.error.message);
            }
            anyhow::bail!("Spotify returned {}", status);
        }

        response
            .json()
            .await
            .context("Failed to parse Spotify response")
    }

    /// How long to wait before retrying `response`
    ///
    /// A 429 waits for its `Retry-After` seconds (one backoff step when the
    /// header is missing); `None` when the server asks for more than
    /// [`MAX_RETRY_AFTER_SECS`]. Server errors back off exponentially.
    fn retry_delay(&self, response: &Response, attempt: u32) -> Option<Duration> {
        let backoff = self.backoff * 2u32.saturating_pow(attempt);
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Some(backoff);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        match retry_after {
            Some(secs) if secs > MAX_RETRY_AFTER_SECS => {
                warn!("Spotify asked to retry after {} seconds, giving up", secs);
                None
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(backoff),
        }
    }
}

/// Keep the first occurrence of each track id
pub fn dedupe_tracks(tracks: impl IntoIterator<Item = Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| seen.insert(track.id.clone()))
        .collect()
}

#[async_trait]
impl MetadataService for SpotifyClient {
    async fn get_track(&self, id: &str) -> Result<Track> {
        let url = format!("{}/tracks/{}", self.api_base, id);
        let track: ApiTrack = self
            .get_json(&url)
            .await
            .with_context(|| format!("Failed to fetch track {}", id))?;

        track
            .into_track()
            .with_context(|| format!("Track {} has no usable metadata", id))
    }

    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let url = format!(
            "{}/playlists/{}?fields=id,name,description,owner(id,display_name),tracks(total)",
            self.api_base, id
        );
        let playlist: ApiPlaylist = self
            .get_json(&url)
            .await
            .with_context(|| format!("Failed to fetch playlist {}", id))?;

        Ok(playlist.into())
    }

    async fn get_playlist_tracks(&self, id: &str) -> Result<Vec<Track>> {
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit={}",
            self.api_base, id, PLAYLIST_PAGE_LIMIT
        ));
        let mut tracks = Vec::new();
        let mut skipped = 0usize;
        let mut page_count = 0usize;

        while let Some(url) = next_url {
            page_count += 1;
            let page: Paging<ApiPlaylistItem> = self
                .get_json(&url)
                .await
                .with_context(|| format!("Failed to fetch page {} of playlist {}", page_count, id))?;

            for item in page.items {
                let track = item
                    .track
                    .and_then(|value| serde_json::from_value::<ApiTrack>(value).ok())
                    .and_then(ApiTrack::into_track);
                match track {
                    Some(track) => tracks.push(track),
                    None => skipped += 1,
                }
            }

            next_url = page.next;
        }

        let total = tracks.len();
        let tracks = dedupe_tracks(tracks);
        debug!(
            "Playlist {}: {} tracks over {} pages ({} unusable, {} duplicates)",
            id,
            tracks.len(),
            page_count,
            skipped,
            total - tracks.len()
        );
        Ok(tracks)
    }
}
