//! Sample attribution: address counts into per-function profile trees

use log::{debug, info};

use crate::sample::SampleReader;
use crate::symbol_map::SymbolMap;
use crate::symbolization::InlineStackResolver;

/// What happened to the samples during attribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributionStats {
    pub attributed_addresses: usize,
    pub attributed_samples: u64,
    /// Addresses outside every known function
    pub unknown_symbol: usize,
    /// Addresses the resolver could not symbolize
    pub empty_stack: usize,
}

/// One attribution pass over a sample set
pub struct Profile<'a> {
    samples: &'a dyn SampleReader,
    resolver: &'a dyn InlineStackResolver,
    symbol_map: &'a mut SymbolMap,
}

impl<'a> Profile<'a> {
    pub fn new(
        samples: &'a dyn SampleReader,
        resolver: &'a dyn InlineStackResolver,
        symbol_map: &'a mut SymbolMap,
    ) -> Self {
        Self { samples, resolver, symbol_map }
    }

    /// Attribute every sampled address to the function containing it.
    ///
    /// Samples at a function's first instruction also count towards its
    /// head count. Addresses that map to no symbol, or to an empty inline
    /// stack, are dropped. Suffixed function variants are merged afterwards.
    pub fn compute_profile(&mut self) -> AttributionStats {
        let mut stats = AttributionStats::default();

        for (&addr, &count) in self.samples.address_count_map() {
            let Some(symbol) = self.symbol_map.symbol_info_by_addr(addr) else {
                debug!("No symbol for sampled address 0x{addr:x}");
                stats.unknown_symbol += 1;
                continue;
            };
            let name = symbol.name.clone();
            // The first instruction of a split-off part is not a function entry
            let is_entry = symbol.start == addr && !self.symbol_map.is_suffixed_variant(&name);

            let stack = self.resolver.inline_stack(addr);
            if !self.symbol_map.add_count(&name, &stack, count, is_entry) {
                debug!("Empty inline stack at 0x{addr:x} in {name}");
                stats.empty_stack += 1;
                continue;
            }
            stats.attributed_addresses += 1;
            stats.attributed_samples = stats.attributed_samples.saturating_add(count);
        }

        self.symbol_map.elide_suffixes_and_merge();
        info!(
            "Attributed {} samples at {} addresses ({} outside functions, {} unresolved)",
            stats.attributed_samples,
            stats.attributed_addresses,
            stats.unknown_symbol,
            stats.empty_stack
        );
        stats
    }
}
