//! LLVM sample-profile text format
//!
//! ```text
//! main:120:3
//!  4: 20
//!  7: 0 __prefetch_T0_0:64
//!  9: parse:100
//!   2: 60
//!   5: helper:40
//!    1: 40
//! ```
//!
//! Each function starts with `name:total:head`. Body lines are indented one
//! space per nesting level: `offset[.disc]: count [target:count ...]` for
//! positions, `offset[.disc]: callee:total` for inlined call sites.

use log::warn;
use std::io::Write;

use super::{ProfileWriter, SymbolListEntry};
use crate::domain::ExportError;
use crate::symbol_map::{FunctionProfile, SymbolMap};

/// Writer for the LLVM text sample-profile format
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProfileWriter;

impl ProfileWriter for TextProfileWriter {
    fn write_profile(
        &self,
        symbol_map: &SymbolMap,
        symbol_list: Option<&[SymbolListEntry]>,
        out: &mut dyn Write,
    ) -> Result<(), ExportError> {
        if symbol_list.is_some() {
            warn!("The text profile format cannot carry a symbol list; use --format json");
        }

        for (name, profile) in symbol_map.profiles_to_emit() {
            writeln!(out, "{name}:{}:{}", profile.total_count, profile.head_count)?;
            write_body(out, profile, 1)?;
        }
        Ok(())
    }
}

fn write_body(out: &mut dyn Write, profile: &FunctionProfile, depth: usize) -> Result<(), ExportError> {
    let indent = " ".repeat(depth);

    for (offset, position) in &profile.positions {
        write!(out, "{indent}{offset}: {}", position.count.to_raw())?;
        for (target, count) in &position.targets {
            write!(out, " {target}:{}", count.to_raw())?;
        }
        writeln!(out)?;
    }

    for ((offset, callee), inlined) in &profile.callsites {
        writeln!(out, "{indent}{offset}: {callee}:{}", inlined.total_count)?;
        write_body(out, inlined, depth + 1)?;
    }
    Ok(())
}
