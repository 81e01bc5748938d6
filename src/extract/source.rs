//! Links the engine can download from without a Spotify lookup

use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectSource {
    YouTube,
    SoundCloud,
}

impl fmt::Display for DirectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectSource::YouTube => f.write_str("YouTube"),
            DirectSource::SoundCloud => f.write_str("SoundCloud"),
        }
    }
}

/// A single YouTube video or SoundCloud track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectLink {
    pub source: DirectSource,
    pub url: String,
}

impl DirectLink {
    /// Recognise a single-item YouTube or SoundCloud link
    ///
    /// Playlists, channels and SoundCloud sets are not single items and
    /// yield `None`, as does anything on another host.
    pub fn parse(input: &str) -> Option<Self> {
        let url = Url::parse(input.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let source = match host {
            "youtube.com" | "m.youtube.com" | "music.youtube.com" => {
                let is_video = match segments.as_slice() {
                    ["watch"] => url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty()),
                    ["shorts", _] => true,
                    _ => false,
                };
                is_video.then_some(DirectSource::YouTube)?
            }
            "youtu.be" => (segments.len() == 1).then_some(DirectSource::YouTube)?,
            "soundcloud.com" | "m.soundcloud.com" => match segments.as_slice() {
                [_, track] if *track != "sets" => DirectSource::SoundCloud,
                _ => return None,
            },
            _ => return None,
        };

        Some(Self {
            source,
            url: url.to_string(),
        })
    }
}
