use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use super::{ProfileWriter, SymbolListEntry};
use crate::domain::{ExportError, ProfileCount};
use crate::symbol_map::{FunctionProfile, SymbolMap};

/// JSON profile document
#[derive(Debug, Serialize)]
struct JsonProfile<'a> {
    functions: Vec<JsonFunction<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol_list: Option<&'a [SymbolListEntry]>,
}

#[derive(Debug, Serialize)]
struct JsonFunction<'a> {
    name: &'a str,
    total_count: u64,
    head_count: u64,
    positions: Vec<JsonPosition<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    callsites: Vec<JsonCallsite<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonPosition<'a> {
    /// `line` or `line.discriminator`, relative to the function start
    offset: String,
    count: ProfileCount,
    #[serde(skip_serializing_if = "no_targets")]
    targets: &'a BTreeMap<String, ProfileCount>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_targets(targets: &&BTreeMap<String, ProfileCount>) -> bool {
    targets.is_empty()
}

#[derive(Debug, Serialize)]
struct JsonCallsite<'a> {
    offset: String,
    #[serde(flatten)]
    callee: JsonFunction<'a>,
}

impl<'a> JsonFunction<'a> {
    fn new(name: &'a str, profile: &'a FunctionProfile) -> Self {
        let positions = profile
            .positions
            .iter()
            .map(|(offset, position)| JsonPosition {
                offset: offset.to_string(),
                count: position.count,
                targets: &position.targets,
            })
            .collect();
        let callsites = profile
            .callsites
            .iter()
            .map(|((offset, callee), inlined)| JsonCallsite {
                offset: offset.to_string(),
                callee: JsonFunction::new(callee, inlined),
            })
            .collect();

        Self {
            name,
            total_count: profile.total_count,
            head_count: profile.head_count,
            positions,
            callsites,
        }
    }
}

/// JSON profile writer
///
/// Counts keep their kind (`execution` or `prefetch_delta`) and prefetch
/// deltas stay signed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProfileWriter;

impl ProfileWriter for JsonProfileWriter {
    fn write_profile(
        &self,
        symbol_map: &SymbolMap,
        symbol_list: Option<&[SymbolListEntry]>,
        out: &mut dyn Write,
    ) -> Result<(), ExportError> {
        let document = JsonProfile {
            functions: symbol_map
                .profiles_to_emit()
                .map(|(name, profile)| JsonFunction::new(name, profile))
                .collect(),
            symbol_list,
        };
        serde_json::to_writer_pretty(&mut *out, &document)?;
        writeln!(out)?;
        Ok(())
    }
}
