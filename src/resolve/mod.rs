//! Resolution of Spotify tracks to downloadable sources

pub mod cache;
pub mod youtube;

pub use cache::ResolverCache;
pub use youtube::YoutubeResolver;
