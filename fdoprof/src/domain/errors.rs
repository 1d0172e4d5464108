//! Structured error types for fdoprof
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CreatorError {
    #[error("Unsupported profiler type: {0}")]
    UnsupportedProfiler(String),

    #[error("Profile creator is not bound to a binary")]
    NoBinary,

    #[error("No samples have been read")]
    NoSamples,

    #[error("Error reading profile {path}: {source}")]
    SampleRead {
        path: PathBuf,
        #[source]
        source: SampleFileError,
    },

    #[error("Error reading binary {binary}: {reason}")]
    ResolverUnavailable { binary: PathBuf, reason: String },

    #[error("Cannot open {path} to read prefetch hints: {source}")]
    HintRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: ExportError,
    },
}

#[derive(Error, Debug)]
pub enum SampleFileError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Invalid focus pattern: {0}")]
    FocusPattern(#[from] regex::Error),

    #[error(transparent)]
    PerfData(#[from] linux_perf_data::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to serialize profile: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_profiler_display() {
        let err = CreatorError::UnsupportedProfiler("bogus".to_string());
        assert_eq!(err.to_string(), "Unsupported profiler type: bogus");
    }

    #[test]
    fn test_sample_read_error_chain() {
        let err = CreatorError::SampleRead {
            path: PathBuf::from("/tmp/samples.txt"),
            source: SampleFileError::Parse { line: 3, reason: "expected <addr>:<count>".to_string() },
        };
        assert!(err.to_string().contains("/tmp/samples.txt"));
        assert!(err.to_string().contains("line 3"));
    }
}
