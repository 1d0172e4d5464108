//! # Binary Inspection and Inline-Stack Resolution
//!
//! Everything fdoprof needs from the profiled binary goes through two seams:
//!
//! - [`BinaryImage`]: the symbol table, the build-id, the loadable segments,
//!   and construction of a resolver.
//! - [`InlineStackResolver`]: maps an instruction address to its inline call
//!   stack, innermost frame first.
//!
//! The production implementations are [`ElfBinary`] (reads ELF through
//! `object`) and [`DwarfResolver`] (DWARF through `gimli` and `addr2line`).
//! Tests substitute in-memory images.
//!
//! ## Inline stacks
//!
//! With optimization, one instruction can belong to several functions at
//! once: `helper` inlined into `parse` inlined into `main`. DWARF records
//! this chain and `addr2line` walks it for us:
//!
//! ```text
//! 0x4011a0  ->  [ helper   at util.rs:12     (innermost)
//!                 parse    at parser.rs:88   (call site of helper)
//!                 main     at main.rs:7 ]    (call site of parse)
//! ```
//!
//! The profile stores lines relative to each function's declaration line
//! (`DW_AT_decl_line`) so that edits above a function do not invalidate its
//! profile.
//!
//! ## Sampled-function restriction
//!
//! Symbolizing every address of a large binary is expensive. Profile
//! creation first computes the functions that actually received samples and
//! builds the resolver with [`ResolverScope::SampledFunctions`]; addresses
//! outside those ranges resolve to an empty stack.
//!
//! ## Address spaces
//!
//! Symbols and DWARF use link-time virtual addresses. perf records runtime
//! addresses plus the mapping they came from, which give a file offset; the
//! PT_LOAD segments translate that offset back to a virtual address (see
//! [`LoadSegment`]).

pub mod elf_reader;
pub mod resolver;

pub use elf_reader::{ElfBinary, LoadSegment};
pub use resolver::DwarfResolver;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{InlineStack, SymbolInfo};

/// Which addresses a resolver is allowed to symbolize
#[derive(Debug, Clone, Copy)]
pub enum ResolverScope<'a> {
    /// Every address in the binary
    Unrestricted,
    /// Only addresses inside these functions (start address -> size)
    SampledFunctions(&'a BTreeMap<u64, u64>),
}

/// Resolves instruction addresses to inline call stacks
pub trait InlineStackResolver {
    /// Inline stack for `addr`, innermost frame first; empty if unknown
    fn inline_stack(&self, addr: u64) -> InlineStack;
}

/// The profiled binary, as seen by profile creation
pub trait BinaryImage {
    /// Path the image was loaded from
    fn path(&self) -> &Path;

    /// Hex-encoded GNU build-id, if the binary carries one
    fn build_id(&self) -> Option<String>;

    /// Function symbols, sorted by start address
    fn function_symbols(&self) -> &[SymbolInfo];

    /// PT_LOAD segments, used to map file offsets to virtual addresses
    fn load_segments(&self) -> &[LoadSegment];

    /// Build a resolver for this binary
    ///
    /// # Errors
    /// Returns an error if the binary cannot be read or has no usable debug info
    fn create_resolver(&self, scope: ResolverScope<'_>) -> Result<Box<dyn InlineStackResolver>>;
}
