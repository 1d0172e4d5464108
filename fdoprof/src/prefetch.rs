//! Cache prefetch hints as synthetic profile entries
//!
//! A hint file is a plain csv, one hint per line:
//!
//! ```text
//! <pc hex>,<delta signed decimal>,<hint type>
//! 4011a0,64,T0
//! 4011a0,-32,NTA
//! ```
//!
//! `pc` is a load or store in the profiled binary, `delta` the distance from
//! its memory operand to the next cache miss. Each hint becomes a call
//! target named `__prefetch_<type>_<index>` at the hint's source position,
//! carrying the delta as its count. `index` numbers repeated hints at one pc
//! in file order so their targets stay distinct.

use log::{error, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::domain::{CreatorError, PrefetchHint, ProfileCount};
use crate::symbol_map::SymbolMap;
use crate::symbolization::InlineStackResolver;

/// Prefix of synthetic prefetch call targets
pub const PREFETCH_TARGET_PREFIX: &str = "__prefetch_";

/// Target name for the `index`-th hint of `hint_type` at one address
#[must_use]
pub fn prefetch_target_name(hint_type: &str, index: u32) -> String {
    format!("{PREFETCH_TARGET_PREFIX}{hint_type}_{index}")
}

/// Parse one `<pc hex>,<delta>,<type>` line
///
/// # Errors
/// Returns a description of the problem if the line is malformed
pub fn parse_hint_line(line: &str) -> Result<PrefetchHint, String> {
    let mut fields = line.trim().splitn(3, ',');
    let (Some(pc), Some(delta), Some(hint_type)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("expected <pc>,<delta>,<type>, got '{line}'"));
    };

    let pc = pc.trim();
    let pc = pc.strip_prefix("0x").unwrap_or(pc);
    let address =
        u64::from_str_radix(pc, 16).map_err(|e| format!("invalid address '{pc}': {e}"))?;
    let delta = delta.trim().parse::<i64>().map_err(|e| format!("invalid delta '{delta}': {e}"))?;
    let hint_type = hint_type.trim();
    if hint_type.is_empty() || hint_type.contains(char::is_whitespace) {
        return Err(format!("invalid hint type '{hint_type}'"));
    }

    Ok(PrefetchHint { address, delta, hint_type: hint_type.to_string() })
}

/// Read all hints from `path`.
///
/// Blank lines are skipped. A malformed line is logged and ends reading;
/// the hints before it are kept.
///
/// # Errors
/// Returns an error if the file cannot be read
pub fn read_prefetch_hints(path: &Path) -> Result<Vec<PrefetchHint>, CreatorError> {
    let text = fs::read_to_string(path)
        .map_err(|source| CreatorError::HintRead { path: path.to_path_buf(), source })?;

    let mut hints = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_hint_line(line) {
            Ok(hint) => hints.push(hint),
            Err(reason) => {
                error!("Error reading from {} at line {}: {reason}", path.display(), idx + 1);
                break;
            }
        }
    }
    Ok(hints)
}

/// Outcome of a hint conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    pub converted: usize,
    /// Hints outside every known function
    pub unknown_symbol: usize,
    /// Hints that could not be placed (empty inline stack)
    pub unplaced: usize,
}

/// Attach each hint to the profile of the function containing it.
///
/// Suffixed function variants are merged afterwards.
pub fn convert_prefetch_hints(
    hints: &[PrefetchHint],
    resolver: &dyn InlineStackResolver,
    symbol_map: &mut SymbolMap,
) -> PrefetchStats {
    let mut stats = PrefetchStats::default();
    let mut next_index: HashMap<u64, u32> = HashMap::new();

    for hint in hints {
        let pc = hint.address;
        let Some(name) = symbol_map.symbol_info_by_addr(pc).map(|s| s.name.clone()) else {
            info!("Instruction address not found: 0x{pc:x}");
            stats.unknown_symbol += 1;
            continue;
        };

        let counter = next_index.entry(pc).or_insert(0);
        let index = *counter;
        *counter += 1;

        let stack = resolver.inline_stack(pc);
        if !symbol_map.ensure_entry_in_func_for_symbol(&name, pc) {
            stats.unplaced += 1;
            continue;
        }

        let target = prefetch_target_name(&hint.hint_type, index);
        if symbol_map.add_indirect_call_target(
            &name,
            &stack,
            &target,
            ProfileCount::PrefetchDelta(hint.delta),
        ) {
            stats.converted += 1;
        } else {
            warn!(
                "Ignoring address 0x{pc:x}: could not add call target {target}, \
                 the inline stack is likely empty"
            );
            stats.unplaced += 1;
        }
    }

    symbol_map.elide_suffixes_and_merge();
    info!(
        "Converted {} of {} prefetch hints ({} outside functions, {} unplaced)",
        stats.converted,
        hints.len(),
        stats.unknown_symbol,
        stats.unplaced
    );
    stats
}
