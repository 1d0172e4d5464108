//! Analysis of built profiles
//!
//! Pure functions over a populated [`SymbolMap`](crate::symbol_map::SymbolMap),
//! kept apart from profile construction and output.

pub mod callgraph;

pub use callgraph::{dfs, render_dump, CallGraph};
