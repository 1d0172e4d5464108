//! # fdoprof - Main Entry Point
//!
//! Subcommands:
//! - **create**: samples or prefetch hints + binary -> profile
//! - **merge**: add a sample set to a text sample file
//! - **total**: total sample count of a text sample file
//! - **dump**: call graph of the profile that `create` would write

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::Path;

use fdoprof::analysis::{render_dump, CallGraph};
use fdoprof::cli::{Args, Command};
use fdoprof::creator::{merge_sample, CreatorOptions, ProfileCreator};
use fdoprof::domain::{CreatorError, ProfilerKind};
use fdoprof::symbolization::{BinaryImage, ElfBinary};

const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CreatorError>() {
        Some(CreatorError::UnsupportedProfiler(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

fn open_binary(path: &Path) -> Result<Box<dyn BinaryImage>> {
    let binary = ElfBinary::open(path)
        .with_context(|| format!("Error reading binary {}", path.display()))?;
    Ok(Box::new(binary))
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Create { binary, profile, profiler, out, format, creator, store_sym_list } => {
            // Reject the profiler before any file is opened
            profiler.parse::<ProfilerKind>()?;
            let mut creator = ProfileCreator::new(open_binary(&binary)?, creator.into());
            creator.create_profile(
                &profile,
                &profiler,
                format.writer().as_ref(),
                &out,
                store_sym_list,
            )?;
        }

        Command::Merge { profile, profiler, binary, out, focus_binary_re } => {
            let kind = profiler.parse::<ProfilerKind>()?;
            let binary = match (kind, binary) {
                (ProfilerKind::Perf, Some(path)) => Some(open_binary(&path)?),
                (ProfilerKind::Perf, None) => {
                    anyhow::bail!("--binary is required to merge perf samples")
                }
                _ => None,
            };
            let options = CreatorOptions { focus_binary_re, ..CreatorOptions::default() };
            merge_sample(&profile, &profiler, binary, &out, options)?;
            info!("Merged {} into {}", profile.display(), out.display());
        }

        Command::Total { profile } => {
            println!("{}", ProfileCreator::get_total_count_from_text_profile(&profile));
        }

        Command::Dump { binary, profile, profiler, creator, no_demangle } => {
            profiler.parse::<ProfilerKind>()?;
            let mut creator = ProfileCreator::new(open_binary(&binary)?, creator.into());
            let symbol_map = creator.build_profile(&profile, &profiler)?;
            print!("{}", render_dump(&CallGraph::from_symbol_map(&symbol_map), !no_demangle));
        }
    }

    Ok(())
}
