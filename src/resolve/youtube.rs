//! Spotify track to YouTube video resolution

use std::sync::Arc;
use tracing::debug;

use super::ResolverCache;
use crate::extract::{ExtractionEngine, SearchHit};

/// Results requested per query variant
const RESULTS_PER_QUERY: usize = 3;

/// Shortest accepted video, in seconds (exclusive). Rejects previews.
const MIN_DURATION_SECS: f64 = 30.0;

/// Longest accepted video, in seconds (exclusive). Rejects mixes and interviews.
const MAX_DURATION_SECS: f64 = 600.0;

/// Title fragments that mark a video as commentary rather than the track
const BANNED_KEYWORDS: &[&str] = &["interview", "reaction", "review", "tutorial", "live stream"];

/// Finds a playable YouTube URL for an (artist, title) pair
#[derive(Clone)]
pub struct YoutubeResolver {
    engine: Arc<dyn ExtractionEngine>,
    cache: ResolverCache,
}

impl YoutubeResolver {
    pub fn new(engine: Arc<dyn ExtractionEngine>, cache: ResolverCache) -> Self {
        Self { engine, cache }
    }

    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }

    /// Resolve a track by artist and title
    pub async fn resolve(&self, artist: &str, title: &str) -> Option<String> {
        self.resolve_query(&format!("{} {}", artist, title)).await
    }

    /// Resolve a free-form search query
    ///
    /// Tries each query variant in turn and returns the first accepted
    /// candidate. The outcome, including a miss, is cached.
    pub async fn resolve_query(&self, query: &str) -> Option<String> {
        if let Some(cached) = self.cache.lookup(query) {
            debug!("Resolver cache hit for '{}': {:?}", query, cached);
            return cached;
        }

        let mut found = None;
        for variant in query_variants(query) {
            match self.engine.search(&variant, RESULTS_PER_QUERY).await {
                Ok(hits) => {
                    if let Some(hit) = hits.iter().find(|hit| is_acceptable(hit)) {
                        debug!("Resolved '{}' via '{}': {}", query, variant, hit.url);
                        found = Some(hit.url.clone());
                        break;
                    }
                    debug!("No acceptable candidate for '{}'", variant);
                }
                Err(e) => {
                    debug!("Search variant '{}' failed: {}", variant, e);
                }
            }
        }

        self.cache.store(query, found.clone());
        found
    }
}

/// Ordered search variants for a query, without duplicates
fn query_variants(query: &str) -> Vec<String> {
    let candidates = [
        query.to_string(),
        format!("{} official", query),
        format!("{} audio", query),
        query.replace(" - ", " "),
    ];

    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Duration and keyword filter for a search candidate
///
/// A candidate without a reported duration is judged on its title alone.
fn is_acceptable(hit: &SearchHit) -> bool {
    if let Some(duration) = hit.duration {
        if duration <= MIN_DURATION_SECS || duration >= MAX_DURATION_SECS {
            return false;
        }
    }

    let title = hit.title.to_lowercase();
    !BANNED_KEYWORDS.iter().any(|keyword| title.contains(keyword))
}
