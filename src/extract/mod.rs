//! Media extraction engine
//!
//! The download core only needs two things from the engine: a ranked search
//! and "fetch the best audio for this URL into this file". Everything else
//! (format selection, transcoding) stays inside the engine.

pub mod source;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use source::DirectLink;
pub use ytdlp::YtDlp;

/// One search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    /// Duration in seconds, when the engine reports one
    pub duration: Option<f64>,
}

/// Output container/codec for downloaded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Flac,
}

impl AudioFormat {
    /// File extension (and yt-dlp `--audio-format` value)
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Target bitrate for lossy formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl AudioQuality {
    /// yt-dlp `--audio-quality` value for the given format
    pub fn ytdlp_value(self, format: AudioFormat) -> &'static str {
        if format == AudioFormat::Flac {
            // lossless, bitrate is meaningless
            return "0";
        }
        match self {
            AudioQuality::Low => "128K",
            AudioQuality::Medium => "192K",
            AudioQuality::High => "320K",
        }
    }
}

impl std::fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AudioQuality::Low => "low",
            AudioQuality::Medium => "medium",
            AudioQuality::High => "high",
        };
        f.write_str(name)
    }
}

/// Where and how a download should land
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub output_dir: PathBuf,
    /// File name without extension; already sanitized
    pub file_stem: String,
    pub format: AudioFormat,
    pub quality: AudioQuality,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("no output file found for {0}")]
    MissingOutput(String),

    #[error("no media information returned for {0}")]
    NoMetadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The capabilities the download core consumes from the extraction engine
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Ranked search returning at most `top_n` results
    async fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>, EngineError>;

    /// Title and duration of the media behind `url`, without downloading it
    async fn describe(&self, url: &str) -> Result<SearchHit, EngineError>;

    /// Download and transcode the best available audio for `url`
    ///
    /// Returns the path of the produced file.
    async fn download(&self, url: &str, request: &DownloadRequest) -> Result<PathBuf, EngineError>;
}
