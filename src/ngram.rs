//! Fixed-width substring keys for approximate text search.
//!
//! Records publish every n-gram of their indexed text into a multi-valued
//! index field. A query asks for records holding *all* of the query's
//! n-grams, which approximates substring containment: recall is exact, but
//! a record can match without containing the grams contiguously or in
//! order. That is fine for a suggestion list.

use crate::store::{Op, Query};

/// Width used by every n-gram index field in the system.
pub const BIGRAM: usize = 2;

/// All length-`n` windows of `text`, left to right, duplicates kept.
///
/// Counts Unicode scalar values, not bytes. Text shorter than `n` comes back
/// whole as the only key; `n == 0` yields nothing.
pub fn ngram(text: &str, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return vec![text.to_string()];
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Add the lookup conditions for `keys` against an n-gram index field.
///
/// One key becomes a prefix condition so a single typed character still
/// finds the grams that start with it. Several keys become a conjunction of
/// equality conditions, one per key.
pub fn apply_keys(mut query: Query, field: &str, keys: &[String]) -> Query {
    match keys {
        [] => query,
        [only] => query.where_(field, Op::StartsWith, only),
        many => {
            for key in many {
                query = query.where_(field, Op::Eq, key);
            }
            query
        }
    }
}
