//! Playlist download engine

pub mod engine;
pub mod ledger;
pub mod pipeline;

pub use engine::{PlaylistDownloader, Summary, SyncProgress};
pub use ledger::LedgerStore;
pub use pipeline::{PipelineSettings, TrackPipeline};
