//! Symbol map: the binary's function table plus the profile being built
//!
//! The symbol map is the single destination of attribution. It is created
//! for one profile-creation run, mutated in place by the attribution and
//! prefetch passes, and then handed to a writer.
//!
//! # Lookups
//!
//! Functions are kept sorted by start address. Several names can share one
//! address (aliases); the first name of such a group is canonical and is the
//! one lookups return. All names are accepted by
//! [`SymbolMap::ensure_entry_in_func_for_symbol`].
//!
//! # Thresholds
//!
//! Functions whose total count is below the count threshold are not
//! emitted. Prefetch conversion turns this off, since its counts are deltas
//! and not execution frequencies.

pub mod suffix;
pub mod tree;

pub use suffix::{elide_suffix, DEFAULT_ELIDED_SUFFIXES};
pub use tree::{CallsiteKey, FunctionProfile, PositionProfile};

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::{InlineFrame, ProfileCount, SymbolInfo};

/// Default minimum total count for a function to be emitted
pub const DEFAULT_COUNT_THRESHOLD: u64 = 1;

pub struct SymbolMap {
    /// All function symbols, sorted by start address, canonical name first
    symbols: Vec<SymbolInfo>,
    /// Index into `symbols` of the canonical symbol at each distinct start
    canonical: Vec<usize>,
    /// Start address of every known name, aliases included
    start_by_name: HashMap<String, u64>,
    profiles: BTreeMap<String, FunctionProfile>,
    ignore_thresholds: bool,
    count_threshold: u64,
    elided_suffixes: Vec<String>,
}

impl SymbolMap {
    /// Build a symbol map over a function table.
    ///
    /// `symbols` need not be sorted; within one start address the first
    /// name given becomes canonical.
    #[must_use]
    pub fn new(mut symbols: Vec<SymbolInfo>) -> Self {
        // Stable sort keeps the caller's canonical-first order per address
        symbols.sort_by_key(|symbol| symbol.start);

        let mut canonical = Vec::new();
        let mut start_by_name = HashMap::with_capacity(symbols.len());
        for (idx, symbol) in symbols.iter().enumerate() {
            if idx == 0 || symbols[idx - 1].start != symbol.start {
                canonical.push(idx);
            }
            start_by_name.entry(symbol.name.clone()).or_insert(symbol.start);
        }

        Self {
            symbols,
            canonical,
            start_by_name,
            profiles: BTreeMap::new(),
            ignore_thresholds: false,
            count_threshold: DEFAULT_COUNT_THRESHOLD,
            elided_suffixes: DEFAULT_ELIDED_SUFFIXES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Disable count-threshold filtering of emitted functions
    pub fn set_ignore_thresholds(&mut self, ignore: bool) {
        self.ignore_thresholds = ignore;
    }

    pub fn set_count_threshold(&mut self, threshold: u64) {
        self.count_threshold = threshold;
    }

    /// Replace the suffix markers used by [`Self::elide_suffixes_and_merge`]
    pub fn set_elided_suffixes(&mut self, suffixes: Vec<String>) {
        self.elided_suffixes = suffixes;
    }

    /// True if `name` is a split or cloned variant of another function
    #[must_use]
    pub fn is_suffixed_variant(&self, name: &str) -> bool {
        elide_suffix(name, &self.elided_suffixes).len() != name.len()
    }

    /// Function symbol enclosing `addr`
    #[must_use]
    pub fn symbol_info_by_addr(&self, addr: u64) -> Option<&SymbolInfo> {
        let pos = self.canonical.partition_point(|&idx| self.symbols[idx].start <= addr);
        let symbol = &self.symbols[self.canonical[pos.checked_sub(1)?]];
        symbol.contains(addr).then_some(symbol)
    }

    /// Start/size of every function that contains at least one of `addrs`
    #[must_use]
    pub fn sampled_symbol_start_address_size_map(
        &self,
        addrs: &BTreeSet<u64>,
    ) -> BTreeMap<u64, u64> {
        let mut sampled = BTreeMap::new();
        let mut unknown = 0usize;
        for &addr in addrs {
            match self.symbol_info_by_addr(addr) {
                Some(symbol) => {
                    sampled.insert(symbol.start, symbol.size);
                }
                None => unknown += 1,
            }
        }
        if unknown > 0 {
            debug!("{unknown} sampled addresses are outside every known function");
        }
        sampled
    }

    /// Make sure `name` has a profile, creating an empty one if `name` is a
    /// known symbol covering `addr`.
    ///
    /// Returns false if `name` cannot be tied to `addr`.
    pub fn ensure_entry_in_func_for_symbol(&mut self, name: &str, addr: u64) -> bool {
        if self.profiles.contains_key(name) {
            return true;
        }
        let Some(symbol) = self.symbol_info_by_addr(addr) else {
            debug!("No symbol at 0x{addr:x} for {name}");
            return false;
        };
        if self.start_by_name.get(name) != Some(&symbol.start) {
            debug!("{name} does not cover 0x{addr:x} (found {})", symbol.name);
            return false;
        }
        self.profiles.insert(name.to_string(), FunctionProfile::default());
        true
    }

    /// Attribute `count` samples to `stack` in the profile of `name`.
    ///
    /// `is_entry` marks samples at the function's first instruction, which
    /// also count towards its head count. Returns false for an empty stack.
    pub fn add_count(&mut self, name: &str, stack: &[InlineFrame], count: u64, is_entry: bool) -> bool {
        if stack.is_empty() {
            return false;
        }
        let profile = self.profiles.entry(name.to_string()).or_default();
        if is_entry {
            profile.head_count = profile.head_count.saturating_add(count);
        }
        profile.add_count(stack, count);
        true
    }

    /// Record `target` as a call target at the innermost frame of `stack`.
    ///
    /// The function must already have a profile (see
    /// [`Self::ensure_entry_in_func_for_symbol`]). Returns false if it does
    /// not, or if `stack` is empty.
    pub fn add_indirect_call_target(
        &mut self,
        name: &str,
        stack: &[InlineFrame],
        target: &str,
        count: ProfileCount,
    ) -> bool {
        let Some(profile) = self.profiles.get_mut(name) else {
            return false;
        };
        let Some(position) = profile.position_mut(stack) else {
            return false;
        };
        position.targets.insert(target.to_string(), count);
        true
    }

    /// Fold profiles of suffixed variants (`foo.cold`, `foo.isra.0`, ...)
    /// into the profile of the base name
    pub fn elide_suffixes_and_merge(&mut self) {
        let before = self.profiles.len();
        let profiles = std::mem::take(&mut self.profiles);
        for (name, profile) in profiles {
            let base = elide_suffix(&name, &self.elided_suffixes);
            match self.profiles.get_mut(base) {
                Some(existing) => existing.merge(profile),
                None => {
                    self.profiles.insert(base.to_string(), profile);
                }
            }
        }
        if self.profiles.len() != before {
            info!("Merged {} suffixed function profiles", before - self.profiles.len());
        }
    }

    /// Profile recorded for `name`
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&FunctionProfile> {
        self.profiles.get(name)
    }

    /// All recorded profiles, by name
    #[must_use]
    pub fn profiles(&self) -> &BTreeMap<String, FunctionProfile> {
        &self.profiles
    }

    /// Profiles that pass the count threshold, by name
    pub fn profiles_to_emit(&self) -> impl Iterator<Item = (&String, &FunctionProfile)> + '_ {
        let threshold = if self.ignore_thresholds { 0 } else { self.count_threshold };
        self.profiles.iter().filter(move |(_, profile)| profile.total_count >= threshold)
    }

    /// Name and size of every function symbol without a profile
    #[must_use]
    pub fn collect_names_for_prof_sym_list(&self) -> Vec<(String, u64)> {
        self.symbols
            .iter()
            .filter(|symbol| !self.profiles.contains_key(elide_suffix(&symbol.name, &self.elided_suffixes)))
            .map(|symbol| (symbol.name.clone(), symbol.size))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol_map() -> SymbolMap {
        SymbolMap::new(vec![
            SymbolInfo::new("bar", 0x2000, 0x20),
            SymbolInfo::new("foo", 0x1000, 0x10),
            SymbolInfo::new("foo_alias", 0x1000, 0x10),
            SymbolInfo::new("foo.cold", 0x3000, 0x8),
        ])
    }

    fn stack(function: &str, line: u32) -> Vec<InlineFrame> {
        vec![InlineFrame::new(function, 1, line)]
    }

    #[test]
    fn test_symbol_info_by_addr() {
        let map = symbol_map();
        assert_eq!(map.symbol_info_by_addr(0x1000).unwrap().name, "foo");
        assert_eq!(map.symbol_info_by_addr(0x100f).unwrap().name, "foo");
        assert_eq!(map.symbol_info_by_addr(0x2010).unwrap().name, "bar");
        assert!(map.symbol_info_by_addr(0x1010).is_none());
        assert!(map.symbol_info_by_addr(0x0fff).is_none());
        assert!(map.symbol_info_by_addr(0x9000).is_none());
    }

    #[test]
    fn test_sampled_function_table_is_exact() {
        let map = symbol_map();
        let addrs = BTreeSet::from([0x1000, 0x1004, 0x2010, 0x1800, 0x5000]);

        let sampled = map.sampled_symbol_start_address_size_map(&addrs);
        assert_eq!(sampled, BTreeMap::from([(0x1000, 0x10), (0x2000, 0x20)]));
    }

    #[test]
    fn test_sampled_function_table_empty() {
        let map = symbol_map();
        assert!(map.sampled_symbol_start_address_size_map(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_ensure_entry_accepts_aliases() {
        let mut map = symbol_map();
        assert!(map.ensure_entry_in_func_for_symbol("foo_alias", 0x1004));
        assert!(map.profile("foo_alias").unwrap().is_empty());
        assert!(map.ensure_entry_in_func_for_symbol("foo", 0x1004));
    }

    #[test]
    fn test_ensure_entry_rejects_mismatch() {
        let mut map = symbol_map();
        assert!(!map.ensure_entry_in_func_for_symbol("bar", 0x1004));
        assert!(!map.ensure_entry_in_func_for_symbol("foo", 0x9000));
        assert!(map.profiles().is_empty());
    }

    #[test]
    fn test_add_count_and_head_count() {
        let mut map = symbol_map();
        assert!(map.add_count("foo", &stack("foo", 2), 5, true));
        assert!(map.add_count("foo", &stack("foo", 3), 2, false));
        assert!(!map.add_count("foo", &[], 9, false));

        let profile = map.profile("foo").unwrap();
        assert_eq!(profile.total_count, 7);
        assert_eq!(profile.head_count, 5);
    }

    #[test]
    fn test_add_indirect_call_target_requires_entry() {
        let mut map = symbol_map();
        let count = ProfileCount::PrefetchDelta(-8);
        assert!(!map.add_indirect_call_target("foo", &stack("foo", 2), "t", count));

        assert!(map.ensure_entry_in_func_for_symbol("foo", 0x1000));
        assert!(!map.add_indirect_call_target("foo", &[], "t", count));
        assert!(map.add_indirect_call_target("foo", &stack("foo", 2), "t", count));
    }

    #[test]
    fn test_is_suffixed_variant() {
        let map = symbol_map();
        assert!(map.is_suffixed_variant("foo.cold"));
        assert!(map.is_suffixed_variant("foo.isra.0"));
        assert!(!map.is_suffixed_variant("foo"));
        assert!(!map.is_suffixed_variant(".cold"));
    }

    #[test]
    fn test_elide_suffixes_and_merge() {
        let mut map = symbol_map();
        map.add_count("foo", &stack("foo", 2), 5, false);
        map.add_count("foo.cold", &stack("foo.cold", 2), 3, false);
        map.add_count("bar", &stack("bar", 2), 1, false);

        map.elide_suffixes_and_merge();
        assert_eq!(map.profiles().len(), 2);
        assert_eq!(map.profile("foo").unwrap().total_count, 8);
        assert!(map.profile("foo.cold").is_none());
    }

    #[test]
    fn test_thresholds() {
        let mut map = symbol_map();
        map.ensure_entry_in_func_for_symbol("foo", 0x1000);
        map.add_count("bar", &stack("bar", 2), 3, false);

        assert_eq!(map.profiles_to_emit().count(), 1);
        map.set_count_threshold(4);
        assert_eq!(map.profiles_to_emit().count(), 0);

        map.set_ignore_thresholds(true);
        assert_eq!(map.profiles_to_emit().count(), 2);
    }

    #[test]
    fn test_collect_names_for_prof_sym_list() {
        let mut map = symbol_map();
        map.add_count("foo", &stack("foo", 2), 5, false);

        let mut names = map.collect_names_for_prof_sym_list();
        names.sort();
        // foo.cold folds onto the profiled foo
        assert_eq!(names, vec![("bar".to_string(), 0x20), ("foo_alias".to_string(), 0x10)]);
    }
}
