//! # Sample Readers
//!
//! A sample reader turns one sample source into address-level counts:
//!
//! - [`TextSampleReaderWriter`]: the plain text sample format. Reads and
//!   writes; used for merging sample sets and for tests.
//! - [`PerfDataSampleReader`]: `perf record` captures, filtered to the
//!   mappings of one binary.
//!
//! Both produce the same [`SampleCounts`]. Addresses are link-time virtual
//! addresses of the profiled binary.

pub mod perf;
pub mod text;

pub use perf::PerfDataSampleReader;
pub use text::TextSampleReaderWriter;

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::SampleFileError;

/// Address -> count
pub type AddressCountMap = BTreeMap<u64, u64>;
/// (begin, end) -> count
pub type RangeCountMap = BTreeMap<(u64, u64), u64>;
/// (from, to) -> count
pub type BranchCountMap = BTreeMap<(u64, u64), u64>;

/// Everything a sample source yields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleCounts {
    pub range_count: RangeCountMap,
    pub address_count: AddressCountMap,
    pub branch_count: BranchCountMap,
    pub total_count: u64,
}

impl SampleCounts {
    /// Recompute `total_count` from the maps: range counts plus address
    /// counts, saturating at `u64::MAX`. Branch counts duplicate the other
    /// sections and are left out.
    pub fn compute_total(&mut self) {
        self.total_count = self
            .range_count
            .values()
            .chain(self.address_count.values())
            .fold(0, |total: u64, &count| total.saturating_add(count));
    }

    /// Every address that appears in the samples
    #[must_use]
    pub fn sampled_addresses(&self) -> BTreeSet<u64> {
        let mut addrs: BTreeSet<u64> = self.address_count.keys().copied().collect();
        for &(begin, end) in self.range_count.keys() {
            addrs.insert(begin);
            addrs.insert(end);
        }
        for &(from, to) in self.branch_count.keys() {
            addrs.insert(from);
            addrs.insert(to);
        }
        addrs
    }

    /// Add another sample set: counts summed per key, new keys added.
    ///
    /// The total is recomputed from the merged maps, so it matches what a
    /// re-read of the written set reports.
    pub fn merge(&mut self, other: &SampleCounts) {
        for (&key, &count) in &other.range_count {
            let entry = self.range_count.entry(key).or_insert(0);
            *entry = entry.saturating_add(count);
        }
        for (&addr, &count) in &other.address_count {
            let entry = self.address_count.entry(addr).or_insert(0);
            *entry = entry.saturating_add(count);
        }
        for (&key, &count) in &other.branch_count {
            let entry = self.branch_count.entry(key).or_insert(0);
            *entry = entry.saturating_add(count);
        }
        self.compute_total();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range_count.is_empty() && self.address_count.is_empty() && self.branch_count.is_empty()
    }
}

/// A source of address-level samples
pub trait SampleReader {
    /// Read the source and compute the total sample count
    ///
    /// # Errors
    /// Returns an error if the source cannot be opened or is malformed
    fn read_and_set_total_count(&mut self) -> Result<(), SampleFileError>;

    /// Counts read so far
    fn counts(&self) -> &SampleCounts;

    fn address_count_map(&self) -> &AddressCountMap {
        &self.counts().address_count
    }

    fn sampled_addresses(&self) -> BTreeSet<u64> {
        self.counts().sampled_addresses()
    }

    fn total_sample_count(&self) -> u64 {
        self.counts().total_count
    }
}
