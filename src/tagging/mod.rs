//! Metadata and cover art for downloaded files

pub mod artwork;
pub mod embed;

pub use artwork::{ArtworkCache, ArtworkFetcher};
pub use embed::MetadataEmbedder;
