//! Geohash prefixes already fetched in full during a session.

use crate::geohash::prefix_related;
use serde::Serialize;
use std::collections::BTreeSet;

/// The set of fetched prefixes. Grows monotonically; only [`reset`](Self::reset)
/// empties it.
///
/// A candidate is redundant when it is prefix-related to any member, in
/// either direction. The coarser-candidate case is conservative: a pan that
/// zooms out over a finer fetched cell skips the coarse fetch even though
/// sibling cells may still be missing.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FetchedPrefixSet {
    prefixes: BTreeSet<String>,
}

impl FetchedPrefixSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_redundant(&self, candidate: &str) -> bool {
        self.covering(candidate).is_some()
    }

    /// The first member that makes `candidate` redundant.
    pub fn covering(&self, candidate: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|fetched| prefix_related(fetched, candidate))
            .map(String::as_str)
    }

    /// Record `candidate` as fetched. Overlapping members are not pruned.
    pub fn mark_covered(&mut self, candidate: &str) {
        self.prefixes.insert(candidate.to_string());
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    pub fn reset(&mut self) {
        self.prefixes.clear();
    }
}
