// src/histogram.rs
//! Ordered histograms used for the resolution diagnostics.
//!
//! Rendered as tab-separated `value\tcount` lines, one bucket per line,
//! keys ascending.

use std::collections::BTreeMap;
use std::fmt;

/// Integer-keyed histogram with ordered iteration.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    counts: BTreeMap<i64, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: i64) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    pub fn insert_count(&mut self, value: i64, count: u64) {
        *self.counts.entry(value).or_insert(0) += count;
    }

    pub fn count(&self, value: i64) -> u64 {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    /// Number of distinct buckets.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of inserted samples.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.counts.iter().map(|(&v, &c)| (v, c))
    }

    pub fn last_key(&self) -> Option<i64> {
        self.counts.keys().next_back().copied()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (value, count) in self.iter() {
            writeln!(f, "{}\t{}", value, count)?;
        }
        Ok(())
    }
}

/// Histogram over fractions in `[0, 1]`, bucketed as whole percents.
///
/// The rendered output always ends at the 100% bucket so that downstream
/// plotting sees the full axis.
#[derive(Debug, Clone, Default)]
pub struct FractionHistogram {
    inner: Histogram,
}

impl FractionHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fraction: f64) {
        assert!((0.0..=1.0).contains(&fraction));
        self.inner.insert((fraction * 100.0) as i64);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Display for FractionHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)?;
        if self.inner.last_key() != Some(100) {
            writeln!(f, "100\t0")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_ordering() {
        let mut h = Histogram::new();
        h.insert(5);
        h.insert(1);
        h.insert(5);
        h.insert(3);

        let buckets: Vec<_> = h.iter().collect();
        assert_eq!(buckets, vec![(1, 1), (3, 1), (5, 2)]);
        assert_eq!(h.total(), 4);
        assert_eq!(h.to_string(), "1\t1\n3\t1\n5\t2\n");
    }

    #[test]
    fn test_fraction_histogram_terminator() {
        let mut h = FractionHistogram::new();
        h.insert(0.5);
        assert_eq!(h.to_string(), "50\t1\n100\t0\n");

        let mut full = FractionHistogram::new();
        full.insert(1.0);
        assert_eq!(full.to_string(), "100\t1\n");

        let empty = FractionHistogram::new();
        assert_eq!(empty.to_string(), "100\t0\n");
    }
}
