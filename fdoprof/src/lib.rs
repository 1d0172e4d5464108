//! # fdoprof - Sample-Based Profiles for Feedback-Directed Optimization
//!
//! fdoprof turns raw, address-level execution samples collected from a
//! running binary into a symbol- and source-aware profile that an
//! ahead-of-time compiler uses to guide inlining, code layout and branch
//! weighting.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │    perf.data     │   │   text samples   │   │ prefetch hints   │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          │ focus + build-id     │                      │
//!          ▼                      ▼                      │
//! ┌─────────────────────────────────────────┐            │
//! │          Sample Readers (sample)        │            │
//! │        address -> count, totals         │            │
//! └────────────────────┬────────────────────┘            │
//!                      │ sampled addresses               │
//!                      ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ProfileCreator (creator)                       │
//! │                                                                 │
//! │   SymbolMap ──▶ sampled-function table ──▶ DwarfResolver        │
//! │       ▲                                         │               │
//! │       └──── Profile::compute_profile ◀──────────┘               │
//! │       └──── convert_prefetch_hints   ◀── unrestricted resolver  │
//! └────────────────────┬────────────────────────────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   Profile Writers (export): text, JSON  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`creator`]: the orchestrator. Builds, merges and counts profiles.
//! - [`sample`]: sample readers for perf.data and the text sample format
//! - [`focus`]: which perf mappings belong to the profiled binary
//! - [`symbolization`]: ELF symbol tables, load segments and DWARF inline
//!   stacks
//! - [`symbol_map`]: function table plus the profile tree being built
//! - [`profile`]: attribution of sample counts to inline stacks
//! - [`prefetch`]: prefetch hints as synthetic call targets
//! - [`export`]: LLVM text and JSON profile writers, symbol list
//! - [`analysis`]: call graph of a built profile
//! - [`cli`]: command-line arguments
//! - [`domain`]: shared types and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! perf record -e cycles:u -o perf.data -- ./server
//! fdoprof create --binary ./server.unstripped --profile perf.data --profiler perf --out server.prof
//! clang -O2 -fprofile-sample-use=server.prof ...
//! ```

pub mod analysis;
pub mod cli;
pub mod creator;
pub mod domain;
pub mod export;
pub mod focus;
pub mod prefetch;
pub mod profile;
pub mod sample;
pub mod symbol_map;
pub mod symbolization;
