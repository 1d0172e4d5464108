//! Binary focus: which mappings in a perf capture belong to the profiled binary
//!
//! perf captures every process on the machine. Samples are kept only for
//! mappings whose path matches the focus pattern and whose build-id agrees
//! with the binary's.

use log::debug;
use std::path::Path;

use crate::symbolization::BinaryImage;

/// Length of a SHA-1 build-id in hex, as perf reports it
pub const BUILD_ID_HEX_LEN: usize = 40;

const UNSTRIPPED_SUFFIX: &str = ".unstripped";

/// Focus pattern and expected build-id for one binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFocus {
    pub pattern: String,
    /// Padded build-id; empty accepts any
    pub build_id: String,
}

/// Right-pad a non-empty build-id with '0' to [`BUILD_ID_HEX_LEN`].
///
/// perf stores build-ids in a fixed 20-byte slot, so shorter ids show up
/// zero-padded. Empty and full-length ids are returned unchanged.
#[must_use]
pub fn pad_build_id(build_id: &str) -> String {
    if build_id.is_empty() || build_id.len() >= BUILD_ID_HEX_LEN {
        return build_id.to_string();
    }
    format!("{build_id:0<width$}", width = BUILD_ID_HEX_LEN)
}

/// Anchored pattern matching any path that ends in the binary's base name.
///
/// A `.unstripped` suffix is dropped first: the profiled process runs the
/// stripped copy.
#[must_use]
pub fn focus_pattern_for(binary: &Path) -> String {
    let path = binary.to_string_lossy();
    let path = path.strip_suffix(UNSTRIPPED_SUFFIX).unwrap_or(&path);
    let basename = path.rsplit('/').next().unwrap_or(path);
    format!(".*/{}$", regex::escape(basename))
}

/// Work out the focus for `binary`.
///
/// An explicit pattern is used verbatim and disables build-id checking.
#[must_use]
pub fn resolve_focus(binary: &dyn BinaryImage, explicit_pattern: Option<&str>) -> BinaryFocus {
    if let Some(pattern) = explicit_pattern {
        return BinaryFocus { pattern: pattern.to_string(), build_id: String::new() };
    }

    let pattern = focus_pattern_for(binary.path());
    let build_id = binary.build_id().map(|id| pad_build_id(&id)).unwrap_or_default();
    if build_id.is_empty() {
        debug!("{} has no build-id, matching on path only", binary.path().display());
    }
    BinaryFocus { pattern, build_id }
}
