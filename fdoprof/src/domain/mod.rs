//! Domain model for fdoprof
//!
//! This module contains core domain types and errors that provide:
//! - A tagged count type instead of reusing one integer for two meanings
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    InlineFrame, InlineStack, LineOffset, PrefetchHint, ProfileCount, ProfilerKind, SymbolInfo,
};

pub use errors::{CreatorError, ExportError, SampleFileError};
