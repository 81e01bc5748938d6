//! Cover art download with signature checks and per-run caching

use anyhow::{Context, Result};
use bytes::Bytes;
use lofty::picture::MimeType;
use reqwest::{Client, ClientBuilder};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// User agent sent with cover art requests
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const SPOTIFY_REFERER: &str = "https://open.spotify.com/";

/// Image formats accepted as cover art
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkMime {
    Jpeg,
    Png,
    Webp,
}

impl ArtworkMime {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtworkMime::Jpeg => "image/jpeg",
            ArtworkMime::Png => "image/png",
            ArtworkMime::Webp => "image/webp",
        }
    }

    pub fn to_lofty(self) -> MimeType {
        match self {
            ArtworkMime::Jpeg => MimeType::Jpeg,
            ArtworkMime::Png => MimeType::Png,
            ArtworkMime::Webp => MimeType::Unknown(self.as_str().to_string()),
        }
    }
}

/// Identify an image by its leading magic bytes
pub fn sniff_mime(data: &[u8]) -> Option<ArtworkMime> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ArtworkMime::Jpeg)
    } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(ArtworkMime::Png)
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(ArtworkMime::Webp)
    } else {
        None
    }
}

/// Validated image bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    pub data: Bytes,
    pub mime: ArtworkMime,
}

/// Image bytes keyed by the SHA-256 of their source URL
#[derive(Debug, Clone, Default)]
pub struct ArtworkCache {
    entries: Arc<Mutex<HashMap<String, Artwork>>>,
}

impl ArtworkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    pub fn get(&self, url: &str) -> Option<Artwork> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&Self::key(url)).cloned()
    }

    /// Insert unless an entry already exists for this URL
    pub fn insert(&self, url: &str, artwork: Artwork) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(Self::key(url)).or_insert(artwork);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// HTTP client for cover art
#[derive(Clone)]
pub struct ArtworkFetcher {
    http_client: Client,
    cache: ArtworkCache,
}

impl ArtworkFetcher {
    pub fn new(timeout: Duration, cache: ArtworkCache) -> Result<Self> {
        let http_client = Self::client_builder(timeout)
            .build()
            .context("Failed to create artwork HTTP client")?;

        Ok(Self::with_client(http_client, cache))
    }

    /// Client settings for image requests: browser user agent, Spotify
    /// referer and `Accept: image/*`
    pub fn client_builder(timeout: Duration) -> ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("image/*"));
        headers.insert(REFERER, HeaderValue::from_static(SPOTIFY_REFERER));

        Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
    }

    pub fn with_client(http_client: Client, cache: ArtworkCache) -> Self {
        Self { http_client, cache }
    }

    pub fn cache(&self) -> &ArtworkCache {
        &self.cache
    }

    /// Download one image
    ///
    /// Any failure, including a body that is not a recognised image, yields
    /// `None`.
    pub async fn fetch(&self, url: &str) -> Option<Artwork> {
        if let Some(cached) = self.cache.get(url) {
            debug!("Artwork cache hit: {}", url);
            return Some(cached);
        }

        let data = match self.download(url).await {
            Ok(data) => data,
            Err(e) => {
                debug!("Artwork download failed for {}: {:#}", url, e);
                return None;
            }
        };

        let Some(mime) = sniff_mime(&data) else {
            debug!("Artwork at {} is not a JPEG, PNG or WEBP image ({} bytes)", url, data.len());
            return None;
        };

        let artwork = Artwork { data, mime };
        self.cache.insert(url, artwork.clone());
        debug!("Fetched {} artwork ({} bytes) from {}", mime.as_str(), artwork.data.len(), url);
        Some(artwork)
    }

    /// Try candidate URLs in order, returning the first usable image
    pub async fn fetch_first(&self, urls: &[String]) -> Option<Artwork> {
        for url in urls {
            if let Some(artwork) = self.fetch(url).await {
                return Some(artwork);
            }
        }
        None
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .context("Artwork request failed")?
            .error_for_status()
            .context("Artwork server returned an error")?;

        response.bytes().await.context("Failed to read artwork body")
    }
}
