//! Domain types shared by the readers, the symbol map and the writers
//!
//! These are plain value types. Anything that owns I/O lives elsewhere.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::errors::CreatorError;

/// Where the samples for a profile come from.
///
/// `Prefetch` is not a sample source: it selects the prefetch-hint
/// conversion mode of profile creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilerKind {
    /// `perf record` capture (perf.data)
    Perf,
    /// Plain text sample file
    Text,
    /// Cache prefetch hints (csv)
    Prefetch,
}

impl FromStr for ProfilerKind {
    type Err = CreatorError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "perf" => Ok(Self::Perf),
            "text" => Ok(Self::Text),
            "prefetch" => Ok(Self::Prefetch),
            other => Err(CreatorError::UnsupportedProfiler(other.to_string())),
        }
    }
}

impl fmt::Display for ProfilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Perf => "perf",
            Self::Text => "text",
            Self::Prefetch => "prefetch",
        };
        f.write_str(token)
    }
}

/// A function symbol from the binary's symbol table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: String,
    pub start: u64,
    pub size: u64,
}

impl SymbolInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, start: u64, size: u64) -> Self {
        Self { name: name.into(), start, size }
    }

    /// Check if an address falls within `[start, start + size)`
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr - self.start < self.size
    }
}

/// Source position inside a function, relative to its declaration line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LineOffset {
    pub line: u32,
    pub discriminator: u32,
}

impl LineOffset {
    #[must_use]
    pub fn new(line: u32, discriminator: u32) -> Self {
        Self { line, discriminator }
    }
}

impl fmt::Display for LineOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.discriminator == 0 {
            write!(f, "{}", self.line)
        } else {
            write!(f, "{}.{}", self.line, self.discriminator)
        }
    }
}

/// One frame of an inline stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineFrame {
    /// Linkage name of the function this frame belongs to
    pub function: String,
    /// Declaration line of `function` (0 if unknown)
    pub start_line: u32,
    /// Line inside `function`: the sampled location for the innermost
    /// frame, the call site for outer frames
    pub line: u32,
    pub discriminator: u32,
}

impl InlineFrame {
    #[must_use]
    pub fn new(function: impl Into<String>, start_line: u32, line: u32) -> Self {
        Self { function: function.into(), start_line, line, discriminator: 0 }
    }

    /// Position of this frame relative to the function's declaration
    #[must_use]
    pub fn offset(&self) -> LineOffset {
        LineOffset::new(self.line.saturating_sub(self.start_line), self.discriminator)
    }
}

/// Inline call stack, innermost frame first
pub type InlineStack = Vec<InlineFrame>;

/// Count attached to a profile position or call target.
///
/// Prefetch hints reuse the sample-count slot of the profile format to carry
/// a signed delta. In memory the two meanings stay apart; only the on-disk
/// text format flattens them via [`ProfileCount::to_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProfileCount {
    Execution(u64),
    PrefetchDelta(i64),
}

impl ProfileCount {
    /// The value as stored in the unsigned count field of the profile format
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn to_raw(self) -> u64 {
        match self {
            Self::Execution(count) => count,
            // Two's complement bit pattern, reversible with `as i64`
            Self::PrefetchDelta(delta) => delta as u64,
        }
    }

    /// Fold another count into this one.
    ///
    /// Execution counts add up. A prefetch delta replaces an empty execution
    /// count; otherwise the existing value is kept, since deltas for the
    /// same target name are not additive.
    pub fn accumulate(&mut self, other: ProfileCount) {
        match (*self, other) {
            (Self::Execution(a), Self::Execution(b)) => *self = Self::Execution(a.saturating_add(b)),
            (Self::Execution(0), Self::PrefetchDelta(_)) => *self = other,
            _ => {}
        }
    }
}

impl Default for ProfileCount {
    fn default() -> Self {
        Self::Execution(0)
    }
}

/// A cache prefetch hint read from a hint file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchHint {
    pub address: u64,
    /// Distance to the next cache miss from the accessed memory location
    pub delta: i64,
    /// Locality token, e.g. `NTA` or `T0`; passed through unvalidated
    pub hint_type: String,
}
