//! Profile export
//!
//! A populated [`SymbolMap`] is written in one of two formats:
//!
//! - [`TextProfileWriter`]: the LLVM sample-profile text format, readable
//!   by `clang -fprofile-sample-use` and `llvm-profdata`.
//! - [`JsonProfileWriter`]: a JSON document for inspection and tooling,
//!   which can also carry the profile symbol list.
//!
//! Files are written atomically: the profile is rendered into memory, written
//! to a temporary file next to the destination and renamed over it.

pub mod json;
pub mod llvm_text;
pub mod symbol_list;

pub use json::JsonProfileWriter;
pub use llvm_text::TextProfileWriter;
pub use symbol_list::{fill_profile_symbol_list, SymbolListEntry};

use std::io::{self, Write};
use std::path::Path;

use crate::domain::ExportError;
use crate::symbol_map::SymbolMap;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// LLVM sample-profile text
    #[default]
    Text,
    /// JSON document
    Json,
}

impl OutputFormat {
    /// Writer for this format
    #[must_use]
    pub fn writer(self) -> Box<dyn ProfileWriter> {
        match self {
            Self::Text => Box::new(TextProfileWriter),
            Self::Json => Box::new(JsonProfileWriter),
        }
    }
}

/// Serializes a symbol map to an on-disk profile format
pub trait ProfileWriter {
    /// Render the profile into `out`
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails
    fn write_profile(
        &self,
        symbol_map: &SymbolMap,
        symbol_list: Option<&[SymbolListEntry]>,
        out: &mut dyn Write,
    ) -> Result<(), ExportError>;

    /// Render the profile and atomically replace `path` with it
    ///
    /// # Errors
    /// Returns an error if rendering fails or `path` cannot be written
    fn write_to_file(
        &self,
        symbol_map: &SymbolMap,
        symbol_list: Option<&[SymbolListEntry]>,
        path: &Path,
    ) -> Result<(), ExportError> {
        let mut buffer = Vec::new();
        self.write_profile(symbol_map, symbol_list, &mut buffer)?;
        write_atomically(path, &buffer)?;
        Ok(())
    }
}

/// Replace `path` with `contents` without ever exposing a partial file.
///
/// # Errors
/// Returns an error if the temporary file cannot be created, written or
/// renamed; `path` is untouched in that case
pub fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_write_atomically_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.prof");
        fs::write(&path, "old").unwrap();

        write_atomically(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        // No temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomically_missing_dir() {
        let result = write_atomically(Path::new("/nonexistent/dir/out.prof"), b"x");
        assert!(result.is_err());
    }
}
