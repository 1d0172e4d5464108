use fdoprof::symbolization::{BinaryImage, ElfBinary, ResolverScope};
use std::collections::BTreeMap;

#[test]
fn test_open_own_binary() {
    // The crate's own binary is built with debug info
    let binary_path = env!("CARGO_BIN_EXE_fdoprof");

    let binary = ElfBinary::open(binary_path);
    assert!(binary.is_ok(), "Failed to open binary: {:?}", binary.as_ref().err());

    let binary = binary.unwrap();
    assert!(!binary.function_symbols().is_empty());
    assert!(!binary.load_segments().is_empty());

    // Sorted by start address
    let starts: Vec<u64> = binary.function_symbols().iter().map(|s| s.start).collect();
    assert!(starts.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_resolver_resolves_function_names() {
    let binary_path = env!("CARGO_BIN_EXE_fdoprof");
    let binary = ElfBinary::open(binary_path).expect("Failed to open binary");
    let resolver =
        binary.create_resolver(ResolverScope::Unrestricted).expect("Failed to create resolver");

    // Our own functions carry full debug info
    let own_symbols = binary.function_symbols().iter().filter(|s| s.name.contains("fdoprof"));

    let mut found_valid_symbol = false;
    for symbol in own_symbols.take(20) {
        let stack = resolver.inline_stack(symbol.start);
        println!("0x{:x} {} -> {} frames", symbol.start, symbol.name, stack.len());
        if stack.iter().any(|frame| !frame.function.is_empty()) {
            found_valid_symbol = true;
            break;
        }
    }

    assert!(
        found_valid_symbol,
        "Resolver should resolve at least one function start to an inline stack.\n\
         This might indicate missing debug symbols."
    );
}

#[test]
fn test_scoped_resolver_ignores_other_functions() {
    let binary_path = env!("CARGO_BIN_EXE_fdoprof");
    let binary = ElfBinary::open(binary_path).expect("Failed to open binary");

    let symbols = binary.function_symbols();
    let first = &symbols[0];
    let Some(outside) = symbols.iter().find(|s| s.start >= first.start + first.size) else {
        return;
    };

    let scope = BTreeMap::from([(first.start, first.size)]);
    let resolver = binary
        .create_resolver(ResolverScope::SampledFunctions(&scope))
        .expect("Failed to create resolver");

    assert!(resolver.inline_stack(outside.start).is_empty());
}
