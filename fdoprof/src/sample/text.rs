//! Text sample format
//!
//! Three count-prefixed sections, addresses hex (optional `0x`), counts
//! decimal:
//!
//! ```text
//! 2
//! 1000-1008:3
//! 1010-1020:1
//! 1
//! 1004:7
//! 1
//! 1008->2000:3
//! ```
//!
//! A file may end after any complete section; missing trailing sections are
//! empty.

use log::{debug, info};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::{SampleCounts, SampleReader};
use crate::domain::{ExportError, SampleFileError};
use crate::export::write_atomically;

/// Reader and writer for the text sample format
#[derive(Debug, Clone)]
pub struct TextSampleReaderWriter {
    path: PathBuf,
    counts: SampleCounts,
}

impl TextSampleReaderWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), counts: SampleCounts::default() }
    }

    /// Check if the backing file exists
    #[must_use]
    pub fn is_file_exist(&self) -> bool {
        self.path.is_file()
    }

    /// Add another reader's samples to this one
    pub fn merge(&mut self, other: &dyn SampleReader) {
        self.counts.merge(other.counts());
    }

    /// Replace the held samples
    pub fn set_counts(&mut self, counts: SampleCounts) {
        self.counts = counts;
    }

    /// Write the held samples to `path` (or the reader's own path)
    ///
    /// # Errors
    /// Returns an error if the file cannot be written; the destination is
    /// left untouched in that case
    pub fn write(&self, path: Option<&Path>) -> Result<(), ExportError> {
        let path = path.unwrap_or(&self.path);
        let text = serialize(&self.counts);
        write_atomically(path, text.as_bytes())?;
        info!(
            "Wrote {} addresses ({} samples) to {}",
            self.counts.address_count.len(),
            self.counts.total_count,
            path.display()
        );
        Ok(())
    }
}

impl SampleReader for TextSampleReaderWriter {
    fn read_and_set_total_count(&mut self) -> Result<(), SampleFileError> {
        let text = fs::read_to_string(&self.path)?;
        let mut counts = parse(&text)?;
        counts.compute_total();
        debug!(
            "Read {} ranges, {} addresses, {} branches from {}",
            counts.range_count.len(),
            counts.address_count.len(),
            counts.branch_count.len(),
            self.path.display()
        );
        self.counts = counts;
        Ok(())
    }

    fn counts(&self) -> &SampleCounts {
        &self.counts
    }
}

struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    current: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self { inner: text.lines().enumerate(), current: 0 }
    }

    /// Next non-blank line
    fn next_nonblank(&mut self) -> Option<&'a str> {
        for (idx, line) in self.inner.by_ref() {
            self.current = idx + 1;
            let line = line.trim();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    fn error(&self, reason: impl Into<String>) -> SampleFileError {
        SampleFileError::Parse { line: self.current, reason: reason.into() }
    }

    /// Section header; `None` at end of input
    fn section_len(&mut self) -> Result<Option<usize>, SampleFileError> {
        let Some(line) = self.next_nonblank() else {
            return Ok(None);
        };
        line.parse().map(Some).map_err(|_| self.error(format!("expected entry count, got '{line}'")))
    }

    fn entry(&mut self, what: &str) -> Result<&'a str, SampleFileError> {
        self.next_nonblank().ok_or_else(|| self.error(format!("unexpected end of file, expected {what}")))
    }
}

fn parse_hex(token: &str) -> Option<u64> {
    let token = token.trim();
    let digits = token.strip_prefix("0x").unwrap_or(token);
    u64::from_str_radix(digits, 16).ok()
}

/// Split `<key>:<count>` at the last colon
fn split_count(line: &str) -> Option<(&str, u64)> {
    let (key, count) = line.rsplit_once(':')?;
    Some((key, count.trim().parse().ok()?))
}

fn parse_pair(line: &str, separator: &str) -> Option<(u64, u64, u64)> {
    let (key, count) = split_count(line)?;
    let (a, b) = key.split_once(separator)?;
    Some((parse_hex(a)?, parse_hex(b)?, count))
}

fn parse(text: &str) -> Result<SampleCounts, SampleFileError> {
    let mut lines = Lines::new(text);
    let mut counts = SampleCounts::default();

    let Some(n) = lines.section_len()? else {
        return Ok(counts);
    };
    for _ in 0..n {
        let line = lines.entry("<begin>-<end>:<count>")?;
        let (begin, end, count) =
            parse_pair(line, "-").ok_or_else(|| lines.error("expected <begin>-<end>:<count>"))?;
        counts.range_count.insert((begin, end), count);
    }

    let Some(n) = lines.section_len()? else {
        return Ok(counts);
    };
    for _ in 0..n {
        let line = lines.entry("<addr>:<count>")?;
        let (addr, count) = split_count(line)
            .and_then(|(addr, count)| Some((parse_hex(addr)?, count)))
            .ok_or_else(|| lines.error("expected <addr>:<count>"))?;
        counts.address_count.insert(addr, count);
    }

    let Some(n) = lines.section_len()? else {
        return Ok(counts);
    };
    for _ in 0..n {
        let line = lines.entry("<from>-><to>:<count>")?;
        let (from, to, count) =
            parse_pair(line, "->").ok_or_else(|| lines.error("expected <from>-><to>:<count>"))?;
        counts.branch_count.insert((from, to), count);
    }

    if let Some(extra) = lines.next_nonblank() {
        return Err(lines.error(format!("unexpected trailing data '{extra}'")));
    }
    Ok(counts)
}

fn serialize(counts: &SampleCounts) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", counts.range_count.len());
    for ((begin, end), count) in &counts.range_count {
        let _ = writeln!(out, "{begin:x}-{end:x}:{count}");
    }
    let _ = writeln!(out, "{}", counts.address_count.len());
    for (addr, count) in &counts.address_count {
        let _ = writeln!(out, "{addr:x}:{count}");
    }
    let _ = writeln!(out, "{}", counts.branch_count.len());
    for ((from, to), count) in &counts.branch_count {
        let _ = writeln!(out, "{from:x}->{to:x}:{count}");
    }
    out
}
