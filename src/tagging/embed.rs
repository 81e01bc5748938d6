//! Tag and cover art embedding via lofty

use anyhow::{Context, Result};
use lofty::config::WriteOptions;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemValue, Tag, TagItem, TagType};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::artwork::{Artwork, ArtworkFetcher};
use crate::spotify::Track;

/// Tag layout chosen from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    /// mp3
    Id3v2,
    /// flac, ogg, opus
    Vorbis,
}

impl TagFamily {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp3" => Some(TagFamily::Id3v2),
            "flac" | "ogg" | "opus" => Some(TagFamily::Vorbis),
            _ => None,
        }
    }

    fn tag_type(self) -> TagType {
        match self {
            TagFamily::Id3v2 => TagType::Id3v2,
            TagFamily::Vorbis => TagType::VorbisComments,
        }
    }
}

/// Everything written into a file for one track
#[derive(Debug, Clone)]
pub struct TagSet {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<u32>,
    pub track_number: u32,
    pub duration_ms: u64,
    pub artwork: Option<Artwork>,
}

impl TagSet {
    pub fn from_track(track: &Track, artwork: Option<Artwork>) -> Self {
        Self {
            title: track.name.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            year: track.year(),
            track_number: track.track_number,
            duration_ms: track.duration_ms,
            artwork,
        }
    }
}

/// Write `tags` into the audio file at `path`
///
/// Returns whether the tags were saved. Failures are logged, never raised.
pub fn write_tags(path: &Path, tags: &TagSet) -> bool {
    let Some(family) = TagFamily::from_path(path) else {
        warn!("Unsupported file type for tagging: {}", path.display());
        return false;
    };

    match save_tags(path, family, tags) {
        Ok(()) => {
            verify_tags(path, family, tags);
            true
        }
        Err(e) => {
            warn!("Failed to write tags to {}: {:#}", path.display(), e);
            false
        }
    }
}

fn save_tags(path: &Path, family: TagFamily, tags: &TagSet) -> Result<()> {
    let mut tagged_file = Probe::open(path)
        .context("Failed to open audio file")?
        .read()
        .context("Failed to read audio file")?;

    let tag_type = family.tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .with_context(|| format!("File does not support {:?} tags", tag_type))?;

    tag.insert_text(ItemKey::TrackTitle, tags.title.clone());
    tag.insert_text(ItemKey::TrackArtist, tags.artist.clone());
    tag.insert_text(ItemKey::AlbumTitle, tags.album.clone());
    tag.insert_text(ItemKey::TrackNumber, tags.track_number.to_string());
    if let Some(year) = tags.year {
        tag.set_year(year);
    }

    match family {
        // TLEN is milliseconds
        TagFamily::Id3v2 => {
            tag.insert_text(ItemKey::Length, tags.duration_ms.to_string());
        }
        TagFamily::Vorbis => {
            tag.insert_unchecked(TagItem::new(
                ItemKey::Unknown("LENGTH".to_string()),
                ItemValue::Text((tags.duration_ms / 1000).to_string()),
            ));
        }
    }

    if let Some(artwork) = &tags.artwork {
        while !tag.pictures().is_empty() {
            tag.remove_picture(0);
        }
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(artwork.mime.to_lofty()),
            Some("Cover".to_string()),
            artwork.data.to_vec(),
        ));
    }

    // ID3v2.3 has the widest player support; fall back to v2.4
    if let Err(e) = tagged_file.save_to_path(path, WriteOptions::default().use_id3v23(true)) {
        debug!("ID3v2.3 save failed for {}: {}, retrying with defaults", path.display(), e);
        tagged_file
            .save_to_path(path, WriteOptions::default())
            .context("Failed to save tags")?;
    }

    debug!("Wrote tags to {}", path.display());
    Ok(())
}

/// Re-read the file and check the written tag survived
fn verify_tags(path: &Path, family: TagFamily, tags: &TagSet) {
    let reread = Probe::open(path).and_then(|file| file.read());
    let tagged_file = match reread {
        Ok(file) => file,
        Err(e) => {
            warn!("Could not re-read {} after tagging: {}", path.display(), e);
            return;
        }
    };

    let Some(tag) = tagged_file.tag(family.tag_type()) else {
        warn!("Tag missing after save: {}", path.display());
        return;
    };

    if tag.title().is_none_or(|title| title.is_empty()) {
        warn!("Title missing after save: {}", path.display());
    }
    if tags.year.is_some() && tag.year() != tags.year {
        warn!("Release year missing after save: {}", path.display());
    }
    if tags.artwork.is_some() && tag.pictures().is_empty() {
        warn!("Cover art missing after save: {}", path.display());
    }
}

/// Applies track metadata and artwork to downloaded files
#[derive(Clone)]
pub struct MetadataEmbedder {
    fetcher: ArtworkFetcher,
    embed_metadata: bool,
    embed_artwork: bool,
}

impl MetadataEmbedder {
    pub fn new(fetcher: ArtworkFetcher, embed_metadata: bool, embed_artwork: bool) -> Self {
        Self {
            fetcher,
            embed_metadata,
            embed_artwork,
        }
    }

    /// Tag `path` with `track`'s metadata
    ///
    /// Returns whether the tags were saved. Artwork problems only mean the
    /// file ends up without a cover.
    pub async fn embed(&self, path: &Path, track: &Track) -> bool {
        if !self.embed_metadata {
            debug!("Metadata embedding disabled, leaving {} untouched", path.display());
            return false;
        }
        if TagFamily::from_path(path).is_none() {
            warn!("Unsupported file type for tagging: {}", path.display());
            return false;
        }

        let artwork = if self.embed_artwork && !track.artwork_urls.is_empty() {
            let artwork = self.fetcher.fetch_first(&track.artwork_urls).await;
            if artwork.is_none() {
                debug!("No usable artwork for '{}'", track.name);
            }
            artwork
        } else {
            None
        };

        let tags = TagSet::from_track(track, artwork);
        let path: PathBuf = path.to_path_buf();

        match tokio::task::spawn_blocking(move || write_tags(&path, &tags)).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Tagging task panicked: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::ArtworkCache;
    use crate::tagging::artwork::ArtworkMime;
    use bytes::Bytes;
    use std::time::Duration;

    /// 40 identical MPEG-1 Layer III frames: 128 kbps, 44.1 kHz, stereo
    fn write_mp3(path: &Path) {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        std::fs::write(path, frame.repeat(40)).unwrap();
    }

    /// STREAMINFO (44.1 kHz, stereo, 16 bit), optionally followed by a final PADDING block
    fn write_flac(path: &Path, with_padding: bool) {
        let mut data = b"fLaC".to_vec();
        let last_flag = if with_padding { 0x00 } else { 0x80 };
        data.extend_from_slice(&[last_flag, 0x00, 0x00, 0x22]);
        data.extend_from_slice(&[0x10, 0x00, 0x10, 0x00]);
        data.extend_from_slice(&[0; 6]);
        let info: u32 = (44_100 << 12) | (1 << 9) | (15 << 4);
        data.extend_from_slice(&info.to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&[0; 16]);
        if with_padding {
            data.extend_from_slice(&[0x81, 0x00, 0x00, 0x10]);
            data.extend_from_slice(&[0; 16]);
        }
        std::fs::write(path, data).unwrap();
    }

    fn cover(marker: u8) -> Artwork {
        Artwork {
            data: Bytes::from(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, marker]),
            mime: ArtworkMime::Jpeg,
        }
    }

    fn reread(path: &Path, family: TagFamily) -> Tag {
        Probe::open(path)
            .unwrap()
            .read()
            .unwrap()
            .tag(family.tag_type())
            .cloned()
            .unwrap()
    }

    fn track() -> Track {
        Track {
            id: "4uLU6hMCjMI75M1A2tKUQC".to_string(),
            name: "One More Time".to_string(),
            artist: "Daft Punk".to_string(),
            album: "Discovery".to_string(),
            release_date: "2001-03-12".to_string(),
            duration_ms: 320_357,
            track_number: 1,
            artwork_urls: Vec::new(),
        }
    }

    fn embedder(embed_metadata: bool) -> MetadataEmbedder {
        let fetcher = ArtworkFetcher::new(Duration::from_secs(1), ArtworkCache::new()).unwrap();
        MetadataEmbedder::new(fetcher, embed_metadata, true)
    }

    #[test]
    fn test_family_from_extension() {
        assert_eq!(TagFamily::from_path(Path::new("a/b.mp3")), Some(TagFamily::Id3v2));
        assert_eq!(TagFamily::from_path(Path::new("b.MP3")), Some(TagFamily::Id3v2));
        assert_eq!(TagFamily::from_path(Path::new("b.flac")), Some(TagFamily::Vorbis));
        assert_eq!(TagFamily::from_path(Path::new("b.ogg")), Some(TagFamily::Vorbis));
        assert_eq!(TagFamily::from_path(Path::new("b.opus")), Some(TagFamily::Vorbis));
        assert_eq!(TagFamily::from_path(Path::new("b.m4a")), None);
        assert_eq!(TagFamily::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_tag_set_from_track() {
        let tags = TagSet::from_track(&track(), None);
        assert_eq!(tags.title, "One More Time");
        assert_eq!(tags.year, Some(2001));
        assert_eq!(tags.duration_ms, 320_357);
    }

    #[test]
    fn test_mp3_tags_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Daft Punk - One More Time.mp3");
        write_mp3(&path);

        assert!(write_tags(&path, &TagSet::from_track(&track(), None)));

        let tag = reread(&path, TagFamily::Id3v2);
        assert_eq!(tag.title().as_deref(), Some("One More Time"));
        assert_eq!(tag.artist().as_deref(), Some("Daft Punk"));
        assert_eq!(tag.album().as_deref(), Some("Discovery"));
        assert_eq!(tag.year(), Some(2001));
        assert_eq!(tag.track(), Some(1));
        // TLEN is milliseconds
        assert_eq!(tag.get_string(&ItemKey::Length), Some("320357"));
    }

    #[test]
    fn test_flac_tags_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Daft Punk - One More Time.flac");
        write_flac(&path, true);

        assert!(write_tags(&path, &TagSet::from_track(&track(), None)));

        let tag = reread(&path, TagFamily::Vorbis);
        assert_eq!(tag.title().as_deref(), Some("One More Time"));
        assert_eq!(tag.artist().as_deref(), Some("Daft Punk"));
        assert_eq!(tag.album().as_deref(), Some("Discovery"));
        assert_eq!(tag.year(), Some(2001));
        assert_eq!(tag.track(), Some(1));
        // LENGTH is seconds
        assert_eq!(
            tag.get_string(&ItemKey::Unknown("LENGTH".to_string())),
            Some("320")
        );
    }

    #[test]
    fn test_retagging_replaces_cover() {
        for (name, family) in [("song.mp3", TagFamily::Id3v2), ("song.flac", TagFamily::Vorbis)] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(name);
            match family {
                TagFamily::Id3v2 => write_mp3(&path),
                TagFamily::Vorbis => write_flac(&path, true),
            }

            assert!(write_tags(&path, &TagSet::from_track(&track(), Some(cover(1)))));
            assert!(write_tags(&path, &TagSet::from_track(&track(), Some(cover(2)))));

            let tag = reread(&path, family);
            assert_eq!(tag.pictures().len(), 1, "{}", name);
            let picture = &tag.pictures()[0];
            assert_eq!(picture.pic_type(), PictureType::CoverFront);
            assert_eq!(picture.data(), &cover(2).data[..]);
        }
    }

    #[test]
    fn test_write_tags_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Daft Punk - One More Time.mp3");
        std::fs::write(&path, b"not really audio").unwrap();

        assert!(!write_tags(&path, &TagSet::from_track(&track(), None)));
        assert_eq!(std::fs::read(&path).unwrap(), b"not really audio");
    }

    #[test]
    fn test_write_tags_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        assert!(!write_tags(&path, &TagSet::from_track(&track(), None)));
    }

    #[tokio::test]
    async fn test_embed_disabled_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"not really audio").unwrap();

        assert!(!embedder(false).embed(&path, &track()).await);
        assert_eq!(std::fs::read(&path).unwrap(), b"not really audio");
    }

    #[tokio::test]
    async fn test_embed_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.m4a");
        std::fs::write(&path, b"not really audio").unwrap();
        assert!(!embedder(true).embed(&path, &track()).await);
    }

    #[tokio::test]
    async fn test_embed_writes_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        write_mp3(&path);

        assert!(embedder(true).embed(&path, &track()).await);
        assert_eq!(reread(&path, TagFamily::Id3v2).year(), Some(2001));
    }

    #[tokio::test]
    async fn test_embed_survives_tagger_panic() {
        // lofty 0.22 panics while saving a FLAC whose only block is STREAMINFO
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.flac");
        write_flac(&path, false);

        let embedded = embedder(true).embed(&path, &track()).await;
        if embedded {
            assert_eq!(reread(&path, TagFamily::Vorbis).year(), Some(2001));
        }
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_embed_broken_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.flac");
        std::fs::write(&path, b"not really audio").unwrap();
        assert!(!embedder(true).embed(&path, &track()).await);
    }
}
