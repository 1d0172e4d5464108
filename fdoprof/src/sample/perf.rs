//! perf.data sample reader
//!
//! perf records runtime instruction pointers. To attribute them to the
//! profiled binary we follow its executable mappings:
//!
//! 1. MMAP/MMAP2 records whose path matches the focus pattern (and whose
//!    build-id, when perf knows it, matches the binary) are tracked per pid.
//! 2. A SAMPLE whose ip falls in a tracked mapping of its pid is converted
//!    to a file offset, then to a link-time address via the binary's load
//!    segments.
//!
//! Each sample counts 1 at that address.

use linux_perf_data::linux_perf_event_reader::{CpuMode, EventRecord, Mmap2FileId};
use linux_perf_data::{DsoInfo, DsoKey, PerfFileReader, PerfFileRecord};
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use super::{SampleCounts, SampleReader};
use crate::domain::SampleFileError;
use crate::symbolization::elf_reader::translate_file_offset;
use crate::symbolization::LoadSegment;

const PROT_EXEC: u32 = 0b100;

/// An executable mapping of the profiled binary in one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub start: u64,
    pub len: u64,
    pub page_offset: u64,
}

impl Mapping {
    /// File offset of `ip`, if it falls in this mapping
    #[must_use]
    pub fn file_offset(&self, ip: u64) -> Option<u64> {
        (ip >= self.start && ip - self.start < self.len).then(|| ip - self.start + self.page_offset)
    }
}

/// Tracked mappings of the profiled binary, per pid
#[derive(Debug, Default)]
pub struct MappingTable {
    by_pid: HashMap<i32, Vec<Mapping>>,
}

impl MappingTable {
    /// Track a mapping; a later mapping over the same start replaces it
    pub fn add(&mut self, pid: i32, mapping: Mapping) {
        let mappings = self.by_pid.entry(pid).or_default();
        mappings.retain(|m| m.start != mapping.start);
        mappings.push(mapping);
    }

    /// File offset of `ip` in process `pid`
    #[must_use]
    pub fn file_offset(&self, pid: i32, ip: u64) -> Option<u64> {
        self.by_pid.get(&pid)?.iter().rev().find_map(|m| m.file_offset(ip))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }
}

/// Compare build-ids, ignoring perf's trailing zero padding
#[must_use]
pub fn build_ids_match(expected: &str, actual: &str) -> bool {
    expected.is_empty()
        || actual.is_empty()
        || expected.trim_end_matches('0').eq_ignore_ascii_case(actual.trim_end_matches('0'))
}

/// Reads samples of one binary from a perf.data file
pub struct PerfDataSampleReader {
    path: PathBuf,
    focus: Regex,
    /// Expected build-id, padded; empty accepts any
    build_id: String,
    segments: Vec<LoadSegment>,
    counts: SampleCounts,
}

impl PerfDataSampleReader {
    /// Create a reader for samples of mappings matching `focus_pattern`
    ///
    /// # Errors
    /// Returns an error if `focus_pattern` is not a valid regex
    pub fn new<P: Into<PathBuf>>(
        path: P,
        focus_pattern: &str,
        build_id: String,
        segments: Vec<LoadSegment>,
    ) -> Result<Self, SampleFileError> {
        let focus = Regex::new(focus_pattern)?;
        Ok(Self { path: path.into(), focus, build_id, segments, counts: SampleCounts::default() })
    }

    /// Decide whether a mapped file belongs to the profiled binary
    fn is_focus_mapping(&self, path: &str, build_id: Option<&str>) -> bool {
        if !self.focus.is_match(path) {
            return false;
        }
        match build_id {
            Some(actual) if !build_ids_match(&self.build_id, actual) => {
                warn!("Skipping mapping of {path}: build-id {actual} does not match {}", self.build_id);
                false
            }
            _ => true,
        }
    }

    fn track_mapping(
        &self,
        mappings: &mut MappingTable,
        pid: i32,
        path: &[u8],
        build_id: Option<String>,
        mapping: Mapping,
    ) {
        let path = String::from_utf8_lossy(path);
        if self.is_focus_mapping(&path, build_id.as_deref()) {
            debug!("Tracking {path} in pid {pid} at 0x{:x}+0x{:x}", mapping.start, mapping.len);
            mappings.add(pid, mapping);
        }
    }
}

fn known_build_id(
    build_ids: &HashMap<DsoKey, DsoInfo>,
    path: &[u8],
    cpu_mode: CpuMode,
) -> Option<String> {
    let key = DsoKey::detect(path, cpu_mode)?;
    build_ids.get(&key).map(|info| hex::encode(&info.build_id))
}

impl SampleReader for PerfDataSampleReader {
    fn read_and_set_total_count(&mut self) -> Result<(), SampleFileError> {
        let file = File::open(&self.path)?;
        let PerfFileReader { mut perf_file, mut record_iter } =
            PerfFileReader::parse_file(BufReader::new(file))?;
        let build_ids = perf_file.build_ids().unwrap_or_else(|e| {
            debug!("No build-id section in {}: {e}", self.path.display());
            HashMap::new()
        });

        let mut mappings = MappingTable::default();
        let mut counts = SampleCounts::default();
        let mut samples_seen = 0u64;

        while let Some(record) = record_iter.next_record(&mut perf_file)? {
            let PerfFileRecord::EventRecord { record, .. } = record else {
                continue;
            };
            let parsed = match record.parse() {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!("Skipping unparsable perf record: {e}");
                    continue;
                }
            };
            match parsed {
                EventRecord::Mmap(e) if e.is_executable => {
                    let path = e.path.as_slice();
                    let build_id = known_build_id(&build_ids, &path, e.cpu_mode);
                    let mapping =
                        Mapping { start: e.address, len: e.length, page_offset: e.page_offset };
                    self.track_mapping(&mut mappings, e.pid, &path, build_id, mapping);
                }
                EventRecord::Mmap2(e) if e.protection & PROT_EXEC != 0 => {
                    let path = e.path.as_slice();
                    let build_id = match &e.file_id {
                        Mmap2FileId::BuildId(bytes) => Some(hex::encode(bytes)),
                        Mmap2FileId::InodeAndVersion(_) => {
                            known_build_id(&build_ids, &path, e.cpu_mode)
                        }
                    };
                    let mapping =
                        Mapping { start: e.address, len: e.length, page_offset: e.page_offset };
                    self.track_mapping(&mut mappings, e.pid, &path, build_id, mapping);
                }
                EventRecord::Sample(e) => {
                    samples_seen += 1;
                    let (Some(ip), Some(pid)) = (e.ip, e.pid) else {
                        continue;
                    };
                    if let Some(offset) = mappings.file_offset(pid, ip) {
                        let addr = translate_file_offset(&self.segments, offset);
                        *counts.address_count.entry(addr).or_insert(0) += 1;
                    }
                }
                _ => {}
            }
        }

        if mappings.is_empty() {
            warn!("No mapping in {} matched {}", self.path.display(), self.focus.as_str());
        }
        counts.compute_total();
        info!(
            "Attributed {} of {} perf samples to {} addresses",
            counts.total_count,
            samples_seen,
            counts.address_count.len()
        );
        self.counts = counts;
        Ok(())
    }

    fn counts(&self) -> &SampleCounts {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_file_offset() {
        let mapping = Mapping { start: 0x5555_0000, len: 0x2000, page_offset: 0x1000 };
        assert_eq!(mapping.file_offset(0x5555_0010), Some(0x1010));
        assert_eq!(mapping.file_offset(0x5555_1fff), Some(0x2fff));
        assert_eq!(mapping.file_offset(0x5555_2000), None);
        assert_eq!(mapping.file_offset(0x5554_ffff), None);
    }

    #[test]
    fn test_mapping_table_per_pid() {
        let mut table = MappingTable::default();
        table.add(42, Mapping { start: 0x1000, len: 0x1000, page_offset: 0 });

        assert_eq!(table.file_offset(42, 0x1800), Some(0x800));
        assert_eq!(table.file_offset(43, 0x1800), None);

        // Remapping at the same start replaces the old entry
        table.add(42, Mapping { start: 0x1000, len: 0x1000, page_offset: 0x4000 });
        assert_eq!(table.file_offset(42, 0x1800), Some(0x4800));
    }

    #[test]
    fn test_build_ids_match_ignores_padding() {
        let padded = "abcdef0000000000000000000000000000000000";
        assert!(build_ids_match(padded, "abcdef"));
        assert!(build_ids_match(padded, "ABCDEF00"));
        assert!(!build_ids_match(padded, "abcdee"));
        assert!(build_ids_match("", "abcdef"));
        assert!(build_ids_match(padded, ""));
    }

    #[test]
    fn test_focus_mapping() {
        let reader = PerfDataSampleReader::new(
            "perf.data",
            ".*/server$",
            "abcdef0000000000000000000000000000000000".to_string(),
            Vec::new(),
        )
        .unwrap();

        assert!(reader.is_focus_mapping("/usr/bin/server", None));
        assert!(reader.is_focus_mapping("/usr/bin/server", Some("abcdef")));
        assert!(!reader.is_focus_mapping("/usr/bin/server", Some("123456")));
        assert!(!reader.is_focus_mapping("/usr/bin/server2", None));
    }

    #[test]
    fn test_invalid_focus_pattern() {
        let result = PerfDataSampleReader::new("perf.data", "(", String::new(), Vec::new());
        assert!(matches!(result, Err(SampleFileError::FocusPattern(_))));
    }

    #[test]
    fn test_missing_perf_data_fails() {
        let mut reader =
            PerfDataSampleReader::new("/nonexistent/perf.data", ".*", String::new(), Vec::new())
                .unwrap();
        assert!(matches!(reader.read_and_set_total_count(), Err(SampleFileError::Io(_))));
    }
}
