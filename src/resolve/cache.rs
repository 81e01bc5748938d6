//! Per-run memoization of search results

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Maps a search query to the URL it resolved to, or to an explicit miss
///
/// Keys are normalized, so queries differing only in case or spacing share an
/// entry. A positive result is never replaced once stored. Clones share the
/// same underlying map.
#[derive(Debug, Clone, Default)]
pub struct ResolverCache {
    entries: Arc<Mutex<HashMap<String, Option<String>>>>,
}

/// Case-fold and collapse whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if the query was never stored, `Some(None)` for a recorded miss
    pub fn lookup(&self, query: &str) -> Option<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&normalize_query(query)).cloned()
    }

    /// Record the outcome of resolving `query`
    ///
    /// The first positive result wins: a later miss or a different URL for
    /// the same key is ignored. A recorded miss can still be upgraded.
    pub fn store(&self, query: &str, result: Option<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = entries.entry(normalize_query(query)).or_insert(None);
        if slot.is_none() {
            *slot = result;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
