//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::creator::CreatorOptions;
use crate::export::OutputFormat;
use crate::symbol_map::DEFAULT_COUNT_THRESHOLD;

#[derive(Parser)]
#[command(
    name = "fdoprof",
    about = "Turn sampled instruction addresses into symbol-aware PGO profiles",
    after_help = "\
EXAMPLES:
    fdoprof create --binary ./server --profile perf.data --profiler perf --out server.prof
    fdoprof create --binary ./server --profile hints.csv --profiler prefetch --out prefetch.prof
    fdoprof merge --profile new.txt --profiler text --binary ./server --out all.txt
    fdoprof total --profile all.txt"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a profile from samples or prefetch hints
    Create {
        /// Profiled binary, with debug info
        #[arg(long)]
        binary: PathBuf,

        /// Sample input (perf.data, text samples or prefetch hint csv)
        #[arg(long)]
        profile: PathBuf,

        /// Input kind: perf, text or prefetch
        #[arg(long, default_value = "perf")]
        profiler: String,

        /// Output profile path
        #[arg(long)]
        out: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        #[command(flatten)]
        creator: CreatorArgs,

        /// Embed the list of unprofiled symbols in the profile (only with
        /// --format json; the text format has no place for it)
        #[arg(long)]
        store_sym_list: bool,
    },

    /// Add samples to a text sample file
    Merge {
        /// New samples
        #[arg(long)]
        profile: PathBuf,

        /// Kind of the new samples: perf or text
        #[arg(long, default_value = "text")]
        profiler: String,

        /// Profiled binary (needed for perf input)
        #[arg(long)]
        binary: Option<PathBuf>,

        /// Text sample file to update (created if missing)
        #[arg(long)]
        out: PathBuf,

        /// Regex selecting the binary's mappings in perf data
        #[arg(long, value_name = "REGEX")]
        focus_binary_re: Option<String>,
    },

    /// Print the total sample count of a text sample file
    Total {
        #[arg(long)]
        profile: PathBuf,
    },

    /// Print the call graph reachable from each profiled function
    Dump {
        #[arg(long)]
        binary: PathBuf,

        #[arg(long)]
        profile: PathBuf,

        #[arg(long, default_value = "perf")]
        profiler: String,

        #[command(flatten)]
        creator: CreatorArgs,

        /// Print mangled names
        #[arg(long)]
        no_demangle: bool,
    },
}

/// Profile creation knobs shared by `create` and `dump`
#[derive(clap::Args)]
pub struct CreatorArgs {
    /// Regex selecting the binary's mappings in perf data
    /// (default: any path ending in the binary's file name)
    #[arg(long, value_name = "REGEX")]
    pub focus_binary_re: Option<String>,

    /// Minimum total count for a function to be emitted
    #[arg(long, default_value_t = DEFAULT_COUNT_THRESHOLD)]
    pub count_threshold: u64,

    /// Fraction of unprofiled symbol size to keep in the symbol list
    #[arg(long, default_value_t = 1.0)]
    pub symbol_list_size_coverage_ratio: f64,
}

impl From<CreatorArgs> for CreatorOptions {
    fn from(args: CreatorArgs) -> Self {
        Self {
            focus_binary_re: args.focus_binary_re,
            count_threshold: args.count_threshold,
            symbol_list_size_coverage_ratio: args.symbol_list_size_coverage_ratio,
            ..Self::default()
        }
    }
}
