//! Profile symbol list
//!
//! Functions that exist in the binary but received no samples. Shipping
//! them with the profile lets the compiler tell "cold" apart from "new since
//! the profile was collected".

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolListEntry {
    pub name: String,
    pub size: u64,
}

/// Select the largest unprofiled symbols covering `coverage_ratio` of their
/// total size.
///
/// Largest first; a ratio of 1.0 or more keeps everything, 0 or less keeps
/// nothing.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fill_profile_symbol_list(
    mut names: Vec<(String, u64)>,
    coverage_ratio: f64,
) -> Vec<SymbolListEntry> {
    names.sort_by(|(a_name, a_size), (b_name, b_size)| {
        b_size.cmp(a_size).then_with(|| a_name.cmp(b_name))
    });
    names.dedup_by(|a, b| a.0 == b.0);

    if coverage_ratio <= 0.0 {
        return Vec::new();
    }

    let total: u64 = names.iter().map(|(_, size)| size).sum();
    let target = total as f64 * coverage_ratio.min(1.0);

    let mut covered = 0u64;
    let mut list = Vec::new();
    for (name, size) in names {
        if covered as f64 >= target {
            break;
        }
        covered += size;
        list.push(SymbolListEntry { name, size });
    }
    list
}
