use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, Reader as _, RunTimeEndian};
use log::debug;
use object::{Object, ObjectSection};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use super::{InlineStackResolver, ResolverScope};
use crate::domain::{InlineFrame, InlineStack};

type DwarfReader = EndianRcSlice<RunTimeEndian>;

/// DWARF-backed inline stack resolver
///
/// Includes a cache so repeated lookups of one address (prefetch hints,
/// merged sample sets) do not walk the DWARF again.
pub struct DwarfResolver {
    ctx: Context<DwarfReader>,
    /// Declaration line per function linkage name
    decl_lines: HashMap<String, u32>,
    /// Allowed function ranges; `None` means unrestricted
    scope: Option<BTreeMap<u64, u64>>,
    cache: RefCell<HashMap<u64, InlineStack>>,
}

impl DwarfResolver {
    /// Create a resolver for the given binary
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed, or if DWARF debug info is missing
    pub fn new<P: AsRef<Path>>(binary_path: P, scope: ResolverScope<'_>) -> Result<Self> {
        let binary_data = fs::read(binary_path.as_ref()).context("Failed to read binary file")?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;
        if obj_file.section_by_name(".debug_info").is_none() {
            anyhow::bail!("No DWARF debug information in {}", binary_path.as_ref().display());
        }

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section = |id: gimli::SectionId| -> Result<DwarfReader, gimli::Error> {
            let data = obj_file
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
            Ok(EndianRcSlice::new(Rc::from(&*data), endian))
        };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let decl_lines = index_decl_lines(&dwarf).context("Failed to index subprograms")?;
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let scope = match scope {
            ResolverScope::Unrestricted => None,
            ResolverScope::SampledFunctions(functions) => Some(functions.clone()),
        };
        debug!(
            "DWARF resolver ready: {} subprograms indexed, scope {}",
            decl_lines.len(),
            scope.as_ref().map_or_else(|| "unrestricted".to_string(), |s| format!("{} functions", s.len()))
        );

        Ok(Self { ctx, decl_lines, scope, cache: RefCell::new(HashMap::new()) })
    }

    fn in_scope(&self, addr: u64) -> bool {
        self.scope.as_ref().map_or(true, |scope| ranges_contain(scope, addr))
    }

    fn resolve_uncached(&self, addr: u64) -> InlineStack {
        let mut stack = Vec::new();

        let Ok(mut frame_iter) = self.ctx.find_frames(addr).skip_all_loads() else {
            return stack;
        };
        while let Ok(Some(frame)) = frame_iter.next() {
            let Some(function) =
                frame.function.and_then(|f| f.name.to_string_lossy().ok().map(|s| s.into_owned()))
            else {
                // A hole in the chain would misplace every outer frame
                debug!("Unnamed frame at 0x{addr:x}, dropping stack");
                return Vec::new();
            };
            let line = frame.location.and_then(|loc| loc.line).unwrap_or(0);
            let start_line = self.decl_lines.get(&function).copied().unwrap_or(0);
            stack.push(InlineFrame::new(function, start_line, line));
        }

        stack
    }
}

impl InlineStackResolver for DwarfResolver {
    fn inline_stack(&self, addr: u64) -> InlineStack {
        if !self.in_scope(addr) {
            return Vec::new();
        }

        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        let stack = self.resolve_uncached(addr);
        self.cache.borrow_mut().insert(addr, stack.clone());
        stack
    }
}

/// Check if `addr` falls inside one of the `start -> size` ranges
fn ranges_contain(ranges: &BTreeMap<u64, u64>, addr: u64) -> bool {
    ranges.range(..=addr).next_back().is_some_and(|(&start, &size)| addr - start < size)
}

/// Map every named `DW_TAG_subprogram` to its `DW_AT_decl_line`.
///
/// Keyed by linkage name when present so the keys agree with the names
/// `addr2line` reports and with the symbol table. Units that fail to parse
/// are skipped.
fn index_decl_lines(dwarf: &gimli::Dwarf<DwarfReader>) -> Result<HashMap<String, u32>, gimli::Error> {
    let mut lines = HashMap::new();
    let mut units = dwarf.units();

    while let Some(header) = units.next()? {
        let offset = header.offset();
        let indexed = dwarf.unit(header).and_then(|unit| index_unit(dwarf, &unit, &mut lines));
        if let Err(e) = indexed {
            debug!("Skipping DWARF unit at {offset:?}: {e}");
        }
    }

    Ok(lines)
}

fn index_unit(
    dwarf: &gimli::Dwarf<DwarfReader>,
    unit: &gimli::Unit<DwarfReader>,
    lines: &mut HashMap<String, u32>,
) -> Result<(), gimli::Error> {
    let mut entries = unit.entries();
    while let Some((_, entry)) = entries.next_dfs()? {
        if entry.tag() != gimli::DW_TAG_subprogram {
            continue;
        }
        let Some(line) = entry.attr(gimli::DW_AT_decl_line)?.and_then(|a| a.udata_value()) else {
            continue;
        };
        let name_value = match entry.attr_value(gimli::DW_AT_linkage_name)? {
            Some(value) => value,
            None => match entry.attr_value(gimli::DW_AT_name)? {
                Some(value) => value,
                None => continue,
            },
        };
        let Ok(name) = dwarf.attr_string(unit, name_value) else {
            continue;
        };
        let name = name.to_string_lossy()?.into_owned();
        lines.entry(name).or_insert_with(|| u32::try_from(line).unwrap_or(0));
    }
    Ok(())
}
