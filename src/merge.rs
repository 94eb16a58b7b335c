//! Order-stable, identity-deduplicated accumulation of fetched records.

use std::collections::HashSet;

/// Anything with a stable unique identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

/// The records gathered over a session, in first-seen order.
///
/// Records are never removed or reordered once accepted, so callers can
/// key UI state (markers, list rows) by position or id across merges.
#[derive(Debug, Clone)]
pub struct Accumulator<T> {
    records: Vec<T>,
    seen: HashSet<String>,
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self { records: Vec::new(), seen: HashSet::new() }
    }
}

impl<T: Identified> Accumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every incoming record whose id is new. Returns how many were added.
    ///
    /// Duplicates within `incoming` collapse to their first occurrence.
    /// Merging the same batch twice adds nothing the second time.
    pub fn merge<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let before = self.records.len();
        for record in incoming {
            if self.seen.insert(record.id().to_string()) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.seen.clear();
    }
}

/// Functional form: `existing` unchanged, followed by the new arrivals of
/// `incoming`. Only `incoming` is deduplicated.
pub fn merge<T: Identified + Clone>(existing: &[T], incoming: &[T]) -> Vec<T> {
    let mut seen: HashSet<&str> = existing.iter().map(Identified::id).collect();
    let mut out = existing.to_vec();
    for record in incoming {
        if seen.insert(record.id()) {
            out.push(record.clone());
        }
    }
    out
}
