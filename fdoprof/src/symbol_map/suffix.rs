//! Compiler-generated symbol suffixes
//!
//! Cloned or split copies of a function get names like `foo.cold`,
//! `foo.isra.0` or `_ZN3fooEv.llvm.1234`. The compiler looks profiles up by
//! the original name, so these variants are folded back onto it.

/// Suffix markers stripped by default
pub const DEFAULT_ELIDED_SUFFIXES: &[&str] =
    &[".cold", ".llvm.", ".isra.", ".part.", ".constprop.", ".lto_priv."];

/// Strip the earliest occurrence of any suffix marker and everything after it.
///
/// Names that start with a marker are left alone.
#[must_use]
pub fn elide_suffix<'a, S: AsRef<str>>(name: &'a str, suffixes: &[S]) -> &'a str {
    suffixes
        .iter()
        .filter_map(|suffix| name.find(suffix.as_ref()))
        .filter(|&pos| pos > 0)
        .min()
        .map_or(name, |pos| &name[..pos])
}
