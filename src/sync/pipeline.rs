//! Single-track pipeline: resolve, download, tag

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::TrackFailure;
use crate::extract::{AudioFormat, AudioQuality, DirectLink, DownloadRequest, ExtractionEngine};
use crate::resolve::YoutubeResolver;
use crate::spotify::Track;
use crate::tagging::MetadataEmbedder;
use crate::utils::sanitize_filename;

/// Where downloads go and how they are encoded
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub output_dir: PathBuf,
    pub format: AudioFormat,
    pub quality: AudioQuality,
}

/// Turns one Spotify track into a tagged local file
pub struct TrackPipeline {
    engine: Arc<dyn ExtractionEngine>,
    resolver: YoutubeResolver,
    embedder: MetadataEmbedder,
    settings: PipelineSettings,
}

impl TrackPipeline {
    pub fn new(
        engine: Arc<dyn ExtractionEngine>,
        resolver: YoutubeResolver,
        embedder: MetadataEmbedder,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            engine,
            resolver,
            embedder,
            settings,
        }
    }

    /// Resolve, download and tag `track`
    ///
    /// Tagging is best effort: a file that could not be tagged is still a
    /// successful download.
    pub async fn download_track(&self, track: &Track) -> Result<PathBuf, TrackFailure> {
        let url = self
            .resolver
            .resolve(&track.artist, &track.name)
            .await
            .ok_or(TrackFailure::NotFoundOnSource)?;

        let request = self.request_for(&format!("{} - {}", track.artist, track.name));
        debug!("Downloading '{}' from {}", track.name, url);
        let path = self.fetch(&url, &request).await?;

        if self.embedder.embed(&path, track).await {
            debug!("Tagged {}", path.display());
        }

        info!("Downloaded {} - {}", track.artist, track.name);
        Ok(path)
    }

    /// Download a YouTube or SoundCloud link as-is
    ///
    /// The file is named after the media title the engine reports and gets
    /// no Spotify tags.
    pub async fn download_direct(&self, link: &DirectLink) -> Result<PathBuf, TrackFailure> {
        let media = self
            .engine
            .describe(&link.url)
            .await
            .map_err(|e| TrackFailure::DownloadFailed(e.to_string()))?;

        let request = self.request_for(&media.title);
        debug!("Downloading '{}' from {}", media.title, link.source);
        let path = self.fetch(&link.url, &request).await?;

        info!("Downloaded {} from {}", media.title, link.source);
        Ok(path)
    }

    fn request_for(&self, name: &str) -> DownloadRequest {
        DownloadRequest {
            output_dir: self.settings.output_dir.clone(),
            file_stem: sanitize_filename(name),
            format: self.settings.format,
            quality: self.settings.quality,
        }
    }

    async fn fetch(&self, url: &str, request: &DownloadRequest) -> Result<PathBuf, TrackFailure> {
        let path = self
            .engine
            .download(url, request)
            .await
            .map_err(|e| TrackFailure::DownloadFailed(e.to_string()))?;

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(TrackFailure::DownloadFailed(format!(
                "{} was not created",
                path.display()
            )));
        }
        Ok(path)
    }
}
