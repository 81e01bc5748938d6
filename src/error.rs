//! Typed outcomes of the download core

use thiserror::Error;

/// Why a single track could not be downloaded
///
/// These are expected outcomes: they are recorded against the track and the
/// run carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackFailure {
    /// No acceptable YouTube candidate after exhausting every query variant
    #[error("could not find an acceptable match on YouTube")]
    NotFoundOnSource,

    /// The extraction engine failed or produced no output file
    #[error("download failed: {0}")]
    DownloadFailed(String),
}

/// Errors that abort a whole download run
#[derive(Debug, Error)]
pub enum SyncError {
    /// Spotify could not return the playlist or its tracks
    #[error("failed to fetch metadata for {id}")]
    MetadataFetch {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}
