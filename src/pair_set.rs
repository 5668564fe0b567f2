//! The accumulated set of proximate taxi pairs.

use std::collections::HashSet;

use crate::TaxiPair;

/// Set of unordered taxi pairs found during a scan.
///
/// Only ever grows, and merging is a plain union, so shards filled by
/// different workers can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairSet {
    pairs: HashSet<TaxiPair>,
}

impl PairSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Returns true if it was not already present.
    pub fn insert(&mut self, pair: TaxiPair) -> bool {
        self.pairs.insert(pair)
    }

    /// Record two taxis as a pair, ignoring self-pairs.
    pub fn insert_taxis(&mut self, a: i64, b: i64) -> bool {
        match TaxiPair::new(a, b) {
            Some(pair) => self.insert(pair),
            None => false,
        }
    }

    /// Union another set into this one.
    pub fn merge(&mut self, other: PairSet) {
        if self.pairs.len() < other.pairs.len() {
            let mut other = other;
            other.pairs.extend(self.pairs.drain());
            *self = other;
        } else {
            self.pairs.extend(other.pairs);
        }
    }

    pub fn contains(&self, pair: &TaxiPair) -> bool {
        self.pairs.contains(pair)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &TaxiPair> {
        self.pairs.iter()
    }

    /// Pairs sorted by `(first, second)`.
    pub fn sorted(&self) -> Vec<TaxiPair> {
        let mut pairs: Vec<TaxiPair> = self.pairs.iter().copied().collect();
        pairs.sort_unstable();
        pairs
    }
}

impl FromIterator<TaxiPair> for PairSet {
    fn from_iter<I: IntoIterator<Item = TaxiPair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl Extend<TaxiPair> for PairSet {
    fn extend<I: IntoIterator<Item = TaxiPair>>(&mut self, iter: I) {
        self.pairs.extend(iter);
    }
}
