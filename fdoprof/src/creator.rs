//! Profile creation: from a sample source to a written profile
//!
//! ```text
//! input ──▶ SampleReader ──▶ sampled addresses
//!                                   │
//!                   SymbolMap ◀─────┘  sampled-function table
//!                       │
//!                       ▼
//!          DwarfResolver (scoped) ──▶ Profile::compute_profile
//!                                           │
//!                                           ▼
//!                                     ProfileWriter
//! ```
//!
//! Prefetch hints take a side path: they are not samples, use an
//! unrestricted resolver and are attached as call targets.

use log::{error, info};
use std::path::Path;

use crate::domain::{CreatorError, ProfilerKind, SampleFileError};
use crate::export::{fill_profile_symbol_list, ProfileWriter};
use crate::focus::resolve_focus;
use crate::prefetch::{convert_prefetch_hints, read_prefetch_hints, PrefetchStats};
use crate::profile::{AttributionStats, Profile};
use crate::sample::{PerfDataSampleReader, SampleReader, TextSampleReaderWriter};
use crate::symbol_map::{SymbolMap, DEFAULT_COUNT_THRESHOLD, DEFAULT_ELIDED_SUFFIXES};
use crate::symbolization::{BinaryImage, ResolverScope};

/// Knobs for profile creation
#[derive(Debug, Clone, PartialEq)]
pub struct CreatorOptions {
    /// Regex selecting the binary's mappings in perf data; derived from the
    /// binary path when unset
    pub focus_binary_re: Option<String>,
    /// Minimum total count for a function to be emitted
    pub count_threshold: u64,
    /// Fraction of unprofiled symbol size to list in the profile symbol list
    pub symbol_list_size_coverage_ratio: f64,
    /// Suffix markers folded onto the base function name
    pub elided_suffixes: Vec<String>,
}

impl Default for CreatorOptions {
    fn default() -> Self {
        Self {
            focus_binary_re: None,
            count_threshold: DEFAULT_COUNT_THRESHOLD,
            symbol_list_size_coverage_ratio: 1.0,
            elided_suffixes: DEFAULT_ELIDED_SUFFIXES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Builds profiles for one binary
pub struct ProfileCreator {
    binary: Option<Box<dyn BinaryImage>>,
    options: CreatorOptions,
    sample_reader: Option<Box<dyn SampleReader>>,
}

impl ProfileCreator {
    pub fn new(binary: Box<dyn BinaryImage>, options: CreatorOptions) -> Self {
        Self { binary: Some(binary), options, sample_reader: None }
    }

    /// A creator with no binary; it can only read text samples
    #[must_use]
    pub fn unbound() -> Self {
        Self { binary: None, options: CreatorOptions::default(), sample_reader: None }
    }

    fn binary(&self) -> Result<&dyn BinaryImage, CreatorError> {
        self.binary.as_deref().ok_or(CreatorError::NoBinary)
    }

    /// Read `input` with `profiler`, attribute it, and write the profile to
    /// `output`.
    ///
    /// With `store_sym_list`, unprofiled functions are listed in the output
    /// as well (JSON format only).
    ///
    /// # Errors
    /// Fails on an unknown profiler token (before touching any file), on
    /// unreadable input, when no resolver can be built for the binary, and
    /// when the output cannot be written. `output` is untouched on failure.
    pub fn create_profile(
        &mut self,
        input: &Path,
        profiler: &str,
        writer: &dyn ProfileWriter,
        output: &Path,
        store_sym_list: bool,
    ) -> Result<(), CreatorError> {
        let symbol_map = self.build_profile(input, profiler)?;

        let symbol_list = store_sym_list.then(|| {
            fill_profile_symbol_list(
                symbol_map.collect_names_for_prof_sym_list(),
                self.options.symbol_list_size_coverage_ratio,
            )
        });

        writer
            .write_to_file(&symbol_map, symbol_list.as_deref(), output)
            .map_err(|source| CreatorError::Write { path: output.to_path_buf(), source })?;
        info!("Wrote {} function profiles to {}", symbol_map.profiles_to_emit().count(), output.display());
        Ok(())
    }

    /// Read and attribute `input`, returning the populated symbol map
    ///
    /// # Errors
    /// Same as [`Self::create_profile`], minus the output errors
    pub fn build_profile(&mut self, input: &Path, profiler: &str) -> Result<SymbolMap, CreatorError> {
        let kind: ProfilerKind = profiler.parse()?;
        let mut symbol_map = self.build_symbol_map()?;

        if kind == ProfilerKind::Prefetch {
            symbol_map.set_ignore_thresholds(true);
            self.convert_prefetch_hints(input, &mut symbol_map)?;
        } else {
            self.read_sample(input, kind)?;
            self.compute_profile(&mut symbol_map)?;
        }
        Ok(symbol_map)
    }

    /// Fresh symbol map over the binary's function table
    ///
    /// # Errors
    /// Returns an error if the creator has no binary
    pub fn build_symbol_map(&self) -> Result<SymbolMap, CreatorError> {
        let mut symbol_map = SymbolMap::new(self.binary()?.function_symbols().to_vec());
        symbol_map.set_count_threshold(self.options.count_threshold);
        symbol_map.set_elided_suffixes(self.options.elided_suffixes.clone());
        Ok(symbol_map)
    }

    /// Read samples from `input` with the reader for `kind`
    ///
    /// # Errors
    /// Fails if `kind` has no reader, if perf data is requested without a
    /// binary, or if reading fails
    pub fn read_sample(&mut self, input: &Path, kind: ProfilerKind) -> Result<(), CreatorError> {
        let sample_error = |source: SampleFileError| CreatorError::SampleRead {
            path: input.to_path_buf(),
            source,
        };

        let mut reader: Box<dyn SampleReader> = match kind {
            ProfilerKind::Perf => {
                let binary = self.binary()?;
                let focus = resolve_focus(binary, self.options.focus_binary_re.as_deref());
                info!("Reading perf samples matching {} (build-id '{}')", focus.pattern, focus.build_id);
                let reader = PerfDataSampleReader::new(
                    input,
                    &focus.pattern,
                    focus.build_id,
                    binary.load_segments().to_vec(),
                )
                .map_err(sample_error)?;
                Box::new(reader)
            }
            ProfilerKind::Text => Box::new(TextSampleReaderWriter::new(input)),
            ProfilerKind::Prefetch => {
                return Err(CreatorError::UnsupportedProfiler(kind.to_string()));
            }
        };

        if let Err(e) = reader.read_and_set_total_count() {
            error!("Error reading profile {}: {e}", input.display());
            return Err(sample_error(e));
        }
        self.sample_reader = Some(reader);
        Ok(())
    }

    /// Attribute the samples read by [`Self::read_sample`] into `symbol_map`.
    ///
    /// Only functions that received samples are symbolized.
    ///
    /// # Errors
    /// Fails if nothing has been read or no resolver can be built
    pub fn compute_profile(&self, symbol_map: &mut SymbolMap) -> Result<AttributionStats, CreatorError> {
        let reader = self.sample_reader.as_deref().ok_or(CreatorError::NoSamples)?;
        let binary = self.binary()?;

        let sampled_functions =
            symbol_map.sampled_symbol_start_address_size_map(&reader.sampled_addresses());
        info!("{} functions received samples", sampled_functions.len());

        let resolver = binary
            .create_resolver(ResolverScope::SampledFunctions(&sampled_functions))
            .map_err(|e| resolver_error(binary, &e))?;

        Ok(Profile::new(reader, resolver.as_ref(), symbol_map).compute_profile())
    }

    /// Read prefetch hints from `input` and attach them to `symbol_map`
    ///
    /// # Errors
    /// Fails if no resolver can be built or the hint file cannot be read
    pub fn convert_prefetch_hints(
        &self,
        input: &Path,
        symbol_map: &mut SymbolMap,
    ) -> Result<PrefetchStats, CreatorError> {
        let binary = self.binary()?;
        let resolver = binary
            .create_resolver(ResolverScope::Unrestricted)
            .map_err(|e| resolver_error(binary, &e))?;

        let hints = read_prefetch_hints(input)?;
        Ok(convert_prefetch_hints(&hints, resolver.as_ref(), symbol_map))
    }

    /// Total sample count of the last read, 0 if nothing was read
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.sample_reader.as_ref().map_or(0, |reader| reader.total_sample_count())
    }

    #[must_use]
    pub fn sample_reader(&self) -> Option<&dyn SampleReader> {
        self.sample_reader.as_deref()
    }

    /// Total sample count of a text sample file, 0 if it cannot be read
    #[must_use]
    pub fn get_total_count_from_text_profile(input: &Path) -> u64 {
        let mut creator = Self::unbound();
        match creator.read_sample(input, ProfilerKind::Text) {
            Ok(()) => creator.total_samples(),
            Err(_) => 0,
        }
    }
}

fn resolver_error(binary: &dyn BinaryImage, e: &anyhow::Error) -> CreatorError {
    let err = CreatorError::ResolverUnavailable {
        binary: binary.path().to_path_buf(),
        reason: format!("{e:#}"),
    };
    error!("{err}");
    err
}

/// Add the samples in `input` to the text sample file `output`.
///
/// `output` is created if missing. `binary` is only needed for perf input.
///
/// # Errors
/// Fails on an unknown profiler token, if either file cannot be read, or if
/// `output` cannot be written; `output` is untouched on failure
pub fn merge_sample(
    input: &Path,
    profiler: &str,
    binary: Option<Box<dyn BinaryImage>>,
    output: &Path,
    options: CreatorOptions,
) -> Result<(), CreatorError> {
    let kind: ProfilerKind = profiler.parse()?;

    let mut writer = TextSampleReaderWriter::new(output);
    if writer.is_file_exist() {
        writer
            .read_and_set_total_count()
            .map_err(|source| CreatorError::SampleRead { path: output.to_path_buf(), source })?;
    }

    let mut creator = ProfileCreator { binary, options, sample_reader: None };
    creator.read_sample(input, kind)?;
    let Some(reader) = creator.sample_reader() else {
        return Err(CreatorError::NoSamples);
    };
    writer.merge(reader);

    writer
        .write(None)
        .map_err(|source| CreatorError::Write { path: output.to_path_buf(), source })
}
