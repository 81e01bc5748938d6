//! Parsing of Spotify share links and URIs

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Track,
    Playlist,
    Album,
}

impl LinkKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "track" => Some(LinkKind::Track),
            "playlist" => Some(LinkKind::Playlist),
            "album" => Some(LinkKind::Album),
            _ => None,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkKind::Track => "track",
            LinkKind::Playlist => "playlist",
            LinkKind::Album => "album",
        };
        f.write_str(name)
    }
}

/// A Spotify resource identified by kind and base62 id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyLink {
    pub kind: LinkKind,
    pub id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("not a Spotify link: {0}")]
    NotSpotify(String),

    #[error("unsupported Spotify link type '{0}'")]
    UnsupportedKind(String),

    #[error("invalid Spotify id '{0}'")]
    InvalidId(String),
}

fn validate_id(id: &str) -> Result<String, LinkError> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(id.to_string())
    } else {
        Err(LinkError::InvalidId(id.to_string()))
    }
}

impl FromStr for SpotifyLink {
    type Err = LinkError;

    /// Accepts `https://open.spotify.com/[intl-xx/]<kind>/<id>[?...]` and
    /// `spotify:<kind>:<id>`
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();

        if let Some(rest) = input.strip_prefix("spotify:") {
            let (kind, id) = rest
                .split_once(':')
                .ok_or_else(|| LinkError::NotSpotify(input.to_string()))?;
            let kind = LinkKind::from_segment(kind)
                .ok_or_else(|| LinkError::UnsupportedKind(kind.to_string()))?;
            return Ok(Self {
                kind,
                id: validate_id(id)?,
            });
        }

        let url = Url::parse(input).map_err(|_| LinkError::NotSpotify(input.to_string()))?;
        if url.host_str() != Some("open.spotify.com") {
            return Err(LinkError::NotSpotify(input.to_string()));
        }

        let mut segments = url
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .skip_while(|s| s.starts_with("intl-"));

        let kind = segments
            .next()
            .ok_or_else(|| LinkError::NotSpotify(input.to_string()))?;
        let id = segments
            .next()
            .ok_or_else(|| LinkError::InvalidId(String::new()))?;
        let kind = LinkKind::from_segment(kind)
            .ok_or_else(|| LinkError::UnsupportedKind(kind.to_string()))?;

        Ok(Self {
            kind,
            id: validate_id(id)?,
        })
    }
}

/// Accept either a full link or a bare id for a playlist argument
pub fn playlist_id(input: &str) -> Result<String, LinkError> {
    match input.parse::<SpotifyLink>() {
        Ok(SpotifyLink {
            kind: LinkKind::Playlist,
            id,
        }) => Ok(id),
        Ok(link) => Err(LinkError::UnsupportedKind(link.kind.to_string())),
        Err(LinkError::NotSpotify(_)) => validate_id(input.trim()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_track_url() {
        let link: SpotifyLink = "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc123"
            .parse()
            .unwrap();
        assert_eq!(link.kind, LinkKind::Track);
        assert_eq!(link.id, "4uLU6hMCjMI75M1A2tKUQC");
    }

    #[test]
    fn test_parse_intl_playlist_url() {
        let link: SpotifyLink = "https://open.spotify.com/intl-de/playlist/37i9dQZF1DXcBWIGoYBM5M"
            .parse()
            .unwrap();
        assert_eq!(link.kind, LinkKind::Playlist);
        assert_eq!(link.id, "37i9dQZF1DXcBWIGoYBM5M");
    }

    #[test]
    fn test_parse_album_uri() {
        let link: SpotifyLink = "spotify:album:1A2GTWGtFfWp7KSQTwWOyo".parse().unwrap();
        assert_eq!(link.kind, LinkKind::Album);
    }

    #[test]
    fn test_rejects_other_hosts() {
        assert!(matches!(
            "https://www.youtube.com/watch?v=abc".parse::<SpotifyLink>(),
            Err(LinkError::NotSpotify(_))
        ));
        assert!(matches!("not a url".parse::<SpotifyLink>(), Err(LinkError::NotSpotify(_))));
    }

    #[test]
    fn test_rejects_unsupported_kind() {
        assert_eq!(
            "https://open.spotify.com/artist/4tZwfgrHOc3mvqYlEYSvVi".parse::<SpotifyLink>(),
            Err(LinkError::UnsupportedKind("artist".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_id() {
        assert!(matches!(
            "spotify:track:abc-def".parse::<SpotifyLink>(),
            Err(LinkError::InvalidId(_))
        ));
        assert!(matches!(
            "https://open.spotify.com/track/".parse::<SpotifyLink>(),
            Err(LinkError::InvalidId(_))
        ));
    }

    #[test]
    fn test_playlist_id() {
        assert_eq!(
            playlist_id("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M").unwrap(),
            "37i9dQZF1DXcBWIGoYBM5M"
        );
        assert_eq!(playlist_id("37i9dQZF1DXcBWIGoYBM5M").unwrap(), "37i9dQZF1DXcBWIGoYBM5M");
        assert!(playlist_id("spotify:track:4uLU6hMCjMI75M1A2tKUQC").is_err());
    }
}
