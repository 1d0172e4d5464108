use fdoprof::creator::{CreatorOptions, ProfileCreator};
use fdoprof::domain::{CreatorError, InlineFrame, InlineStack, SymbolInfo};
use fdoprof::export::{JsonProfileWriter, TextProfileWriter};
use fdoprof::symbolization::{BinaryImage, InlineStackResolver, LoadSegment, ResolverScope};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// In-memory binary: `foo` at [0x1000, 0x1010), `bar` at [0x2000, 0x2020).
struct FakeBinary {
    path: PathBuf,
    symbols: Vec<SymbolInfo>,
}

impl FakeBinary {
    fn boxed() -> Box<dyn BinaryImage> {
        Self::with_symbols(vec![
            SymbolInfo::new("foo", 0x1000, 0x10),
            SymbolInfo::new("bar", 0x2000, 0x20),
        ])
    }

    fn with_symbols(symbols: Vec<SymbolInfo>) -> Box<dyn BinaryImage> {
        Box::new(Self { path: PathBuf::from("/build/out/fake.unstripped"), symbols })
    }
}

/// Every address resolves to a single frame in its function, one line per
/// byte; the scope is honoured the way the DWARF resolver does it. The cold
/// part of `foo` at 0x3000 carries `foo`'s debug info from line 30 on.
struct FakeResolver {
    scope: Option<BTreeMap<u64, u64>>,
}

impl InlineStackResolver for FakeResolver {
    fn inline_stack(&self, addr: u64) -> InlineStack {
        if let Some(scope) = &self.scope {
            let in_scope = scope.range(..=addr).next_back().is_some_and(|(s, len)| addr - s < *len);
            if !in_scope {
                return Vec::new();
            }
        }
        let (function, start, first_line) = match addr {
            0x1000..=0x100f => ("foo", 0x1000, 10),
            0x2000..=0x201f => ("bar", 0x2000, 10),
            0x3000..=0x300f => ("foo", 0x3000, 30),
            _ => return Vec::new(),
        };
        vec![InlineFrame::new(function, 10, first_line + u32::try_from(addr - start).unwrap())]
    }
}

impl BinaryImage for FakeBinary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn build_id(&self) -> Option<String> {
        Some("abcdef".to_string())
    }

    fn function_symbols(&self) -> &[SymbolInfo] {
        &self.symbols
    }

    fn load_segments(&self) -> &[LoadSegment] {
        &[]
    }

    fn create_resolver(
        &self,
        scope: ResolverScope<'_>,
    ) -> anyhow::Result<Box<dyn InlineStackResolver>> {
        let scope = match scope {
            ResolverScope::Unrestricted => None,
            ResolverScope::SampledFunctions(functions) => Some(functions.clone()),
        };
        Ok(Box::new(FakeResolver { scope }))
    }
}

#[test]
fn test_text_samples_attributed_to_enclosing_function() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("samples.txt");
    let output = dir.path().join("out.prof");
    fs::write(&input, "0\n1\n1000:5\n0\n").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    creator.create_profile(&input, "text", &TextProfileWriter, &output, false).unwrap();

    let profile = fs::read_to_string(&output).unwrap();
    assert_eq!(profile, "foo:5:5\n 0: 5\n");
    assert_eq!(creator.total_samples(), 5);
}

#[test]
fn test_split_function_samples_merge_under_base_name() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("samples.txt");
    let output = dir.path().join("out.prof");
    fs::write(&input, "0\n2\n1000:5\n3000:3\n0\n").unwrap();

    let binary = FakeBinary::with_symbols(vec![
        SymbolInfo::new("foo", 0x1000, 0x10),
        SymbolInfo::new("foo.cold", 0x3000, 0x10),
    ]);
    let mut creator = ProfileCreator::new(binary, CreatorOptions::default());
    creator.create_profile(&input, "text", &TextProfileWriter, &output, false).unwrap();

    let profile = fs::read_to_string(&output).unwrap();
    assert!(!profile.contains("foo.cold"));
    assert_eq!(profile, "foo:8:5\n 0: 5\n 20: 3\n");
}

#[test]
fn test_prefetch_hints_become_call_targets() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hints.csv");
    let output = dir.path().join("out.json");
    fs::write(&input, "1000,64,T0\n1000,-32,NTA\n").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    creator.create_profile(&input, "prefetch", &JsonProfileWriter, &output, false).unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let functions = doc["functions"].as_array().unwrap();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0]["name"], "foo");

    let targets = &functions[0]["positions"][0]["targets"];
    assert_eq!(targets["__prefetch_T0_0"]["value"], 64);
    assert_eq!(targets["__prefetch_NTA_1"]["value"], -32);
}

#[test]
fn test_prefetch_delta_written_as_raw_bits() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hints.csv");
    let output = dir.path().join("out.prof");
    fs::write(&input, "1000,64,T0\n1000,-32,NTA\n").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    creator.create_profile(&input, "prefetch", &TextProfileWriter, &output, false).unwrap();

    let profile = fs::read_to_string(&output).unwrap();
    let expected = format!("foo:0:0\n 0: 0 __prefetch_NTA_1:{} __prefetch_T0_0:64\n", (-32i64) as u64);
    assert_eq!(profile, expected);
}

#[test]
fn test_hint_outside_any_symbol_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hints.csv");
    let output = dir.path().join("out.json");
    fs::write(&input, "9000,64,T0\n2004,8,T1\n").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    creator.create_profile(&input, "prefetch", &JsonProfileWriter, &output, false).unwrap();

    let text = fs::read_to_string(&output).unwrap();
    assert!(!text.contains("9000"));
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let functions = doc["functions"].as_array().unwrap();
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0]["name"], "bar");
    assert_eq!(functions[0]["positions"][0]["targets"]["__prefetch_T1_0"]["value"], 8);
}

#[test]
fn test_unsupported_profiler_leaves_output_unwritten() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("samples.txt");
    let output = dir.path().join("out.prof");
    fs::write(&input, "0\n1\n1000:5\n0\n").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    let result = creator.create_profile(&input, "bogus", &TextProfileWriter, &output, false);

    assert!(matches!(result, Err(CreatorError::UnsupportedProfiler(ref t)) if t == "bogus"));
    assert!(!output.exists());
}

#[test]
fn test_unreadable_samples_leave_output_unwritten() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.prof");
    fs::write(&output, "previous").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    let result = creator.create_profile(
        &dir.path().join("missing.txt"),
        "text",
        &TextProfileWriter,
        &output,
        false,
    );

    assert!(matches!(result, Err(CreatorError::SampleRead { .. })));
    assert_eq!(fs::read_to_string(&output).unwrap(), "previous");
}

#[test]
fn test_symbol_list_lists_unprofiled_functions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("samples.txt");
    let output = dir.path().join("out.json");
    fs::write(&input, "0\n1\n1004:3\n0\n").unwrap();

    let mut creator = ProfileCreator::new(FakeBinary::boxed(), CreatorOptions::default());
    creator.create_profile(&input, "text", &JsonProfileWriter, &output, true).unwrap();

    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    let list = doc["symbol_list"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "bar");
    assert_eq!(list[0]["size"], 0x20);
}

#[test]
fn test_count_threshold_filters_cold_functions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("samples.txt");
    let output = dir.path().join("out.prof");
    fs::write(&input, "0\n2\n1000:5\n2000:1\n0\n").unwrap();

    let options = CreatorOptions { count_threshold: 2, ..CreatorOptions::default() };
    let mut creator = ProfileCreator::new(FakeBinary::boxed(), options);
    creator.create_profile(&input, "text", &TextProfileWriter, &output, false).unwrap();

    let profile = fs::read_to_string(&output).unwrap();
    assert!(profile.starts_with("foo:5:5"));
    assert!(!profile.contains("bar"));
}
