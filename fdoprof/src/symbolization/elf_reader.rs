//! ELF reading: symbol table, build-id and load segments
//!
//! The file is parsed once when opened and only the extracted tables are
//! kept. DWARF is loaded separately by [`DwarfResolver`], and only when a
//! resolver is requested.

use anyhow::{Context, Result};
use log::{debug, info};
use object::{Object, ObjectSegment, ObjectSymbol, SymbolKind};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::{BinaryImage, DwarfResolver, InlineStackResolver, ResolverScope};
use crate::domain::SymbolInfo;

/// A PT_LOAD segment: where a range of file bytes lands in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment {
    pub address: u64,
    pub file_offset: u64,
    pub file_size: u64,
}

impl LoadSegment {
    /// Check if a file offset falls within this segment
    #[must_use]
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.file_offset && offset - self.file_offset < self.file_size
    }
}

/// Translate a file offset to a virtual address using `segments`.
///
/// Offsets outside every segment are returned unchanged.
#[must_use]
pub fn translate_file_offset(segments: &[LoadSegment], offset: u64) -> u64 {
    segments
        .iter()
        .find(|seg| seg.contains_offset(offset))
        .map_or(offset, |seg| seg.address + (offset - seg.file_offset))
}

/// An ELF binary opened for profile creation
#[derive(Debug)]
pub struct ElfBinary {
    path: PathBuf,
    build_id: Option<String>,
    symbols: Vec<SymbolInfo>,
    segments: Vec<LoadSegment>,
}

impl ElfBinary {
    /// Open and parse a binary
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not an object file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data =
            fs::read(path).with_context(|| format!("Failed to read binary {}", path.display()))?;
        let obj = object::File::parse(&*data).context("Failed to parse object file")?;

        let build_id = match obj.build_id() {
            Ok(Some(bytes)) => Some(hex::encode(bytes)),
            Ok(None) => None,
            Err(e) => {
                debug!("Cannot read build-id of {}: {e}", path.display());
                None
            }
        };

        let symbols = read_function_symbols(&obj);
        let segments: Vec<LoadSegment> = obj
            .segments()
            .filter_map(|segment| {
                let (file_offset, file_size) = segment.file_range();
                (file_size > 0).then(|| LoadSegment {
                    address: segment.address(),
                    file_offset,
                    file_size,
                })
            })
            .collect();

        info!(
            "Loaded {}: {} function symbols, {} load segments, build-id {}",
            path.display(),
            symbols.len(),
            segments.len(),
            build_id.as_deref().unwrap_or("<none>")
        );

        Ok(Self { path: path.to_path_buf(), build_id, symbols, segments })
    }
}

impl BinaryImage for ElfBinary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn build_id(&self) -> Option<String> {
        self.build_id.clone()
    }

    fn function_symbols(&self) -> &[SymbolInfo] {
        &self.symbols
    }

    fn load_segments(&self) -> &[LoadSegment] {
        &self.segments
    }

    fn create_resolver(&self, scope: ResolverScope<'_>) -> Result<Box<dyn InlineStackResolver>> {
        let resolver = DwarfResolver::new(&self.path, scope)?;
        Ok(Box::new(resolver))
    }
}

/// Defined, non-empty text symbols from `.symtab` and `.dynsym`.
///
/// Sorted by address; at one address global symbols come first, then
/// shorter names, so the first symbol of a group is the canonical one.
fn read_function_symbols(obj: &object::File<'_>) -> Vec<SymbolInfo> {
    let mut seen = HashSet::new();
    let mut records: Vec<(SymbolInfo, bool)> = obj
        .symbols()
        .chain(obj.dynamic_symbols())
        .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.is_definition())
        .filter(|symbol| symbol.address() != 0 && symbol.size() != 0)
        .filter_map(|symbol| {
            let name = symbol.name().ok()?;
            if name.is_empty() || !seen.insert((name.to_string(), symbol.address())) {
                return None;
            }
            Some((SymbolInfo::new(name, symbol.address(), symbol.size()), symbol.is_global()))
        })
        .collect();

    records.sort_by(|(a, a_global), (b, b_global)| {
        a.start
            .cmp(&b.start)
            .then(b_global.cmp(a_global))
            .then(a.name.len().cmp(&b.name.len()))
            .then(a.name.cmp(&b.name))
    });
    records.into_iter().map(|(symbol, _)| symbol).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<LoadSegment> {
        vec![
            LoadSegment { address: 0x40_0000, file_offset: 0, file_size: 0x1000 },
            LoadSegment { address: 0x40_1000, file_offset: 0x1000, file_size: 0x5000 },
        ]
    }

    #[test]
    fn test_translate_file_offset_in_segment() {
        assert_eq!(translate_file_offset(&segments(), 0x1234), 0x40_1234);
        assert_eq!(translate_file_offset(&segments(), 0x10), 0x40_0010);
    }

    #[test]
    fn test_translate_file_offset_outside_segments() {
        assert_eq!(translate_file_offset(&segments(), 0x9000), 0x9000);
        assert_eq!(translate_file_offset(&[], 0x1234), 0x1234);
    }

    #[test]
    fn test_open_missing_binary_fails() {
        let result = ElfBinary::open("/nonexistent/binary");
        assert!(result.is_err());
    }
}
