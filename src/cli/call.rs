use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};
use unwrap::unwrap;

use crate::call_cnvs::SETTINGS_FILENAME;

#[derive(Args, Default, Deserialize, Serialize)]
pub struct CallSettings {
    /// Directory for all output (must not already exist unless --clobber is given)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_output"))]
    pub output_dir: Utf8PathBuf,

    /// Exon read-count matrix in tsv format, optionally gzip-compressed.
    ///
    /// One row per exon interval with key columns CHR, START, END and EXON_ID, followed by
    /// one count column per sample.
    ///
    #[arg(long = "counts", value_name = "FILE")]
    pub counts_filename: String,

    /// Regex selecting which cohort samples to call CNVs for.
    ///
    /// All cohort samples remain eligible as reference candidates regardless of this
    /// selection. By default every sample is called.
    ///
    #[arg(long = "samples", value_name = "REGEX")]
    pub sample_regex: Option<String>,

    /// Minimum number of correlated reference samples required to call a test sample.
    ///
    /// Samples with fewer eligible reference candidates are skipped and reported in the run
    /// summary, the remainder of the cohort is still processed.
    ///
    #[arg(long, value_name = "COUNT", default_value_t = 5)]
    pub min_reference_samples: usize,

    /// Maximum number of reference samples used as the baseline for one test sample.
    ///
    /// Larger reference sets dilute sample-specific sequencing bias, smaller ones leave the
    /// per-exon dispersion estimates underdetermined.
    ///
    #[arg(long, value_name = "COUNT", default_value_t = 30)]
    pub max_reference_samples: usize,

    /// Minimum read depth for an exon to be informative.
    ///
    /// Exons where both the observed and the expected test-sample depth fall below this value
    /// are excluded from scoring for that sample.
    ///
    #[arg(long = "min-depth", value_name = "DEPTH", default_value_t = 10)]
    pub min_read_depth: u32,

    /// Minimum aggregate Bayes factor for a CNV call to be emitted
    #[arg(long, value_name = "FLOAT", default_value_t = 10.0)]
    pub min_bayes_factor: f64,

    /// Number of consecutive non-scored exons tolerated inside one CNV segment before
    /// genomic continuity is considered broken
    #[arg(long, value_name = "COUNT", default_value_t = 0)]
    pub max_call_gap: usize,

    /// Upper bound on the per-exon beta-binomial concentration estimate. The segmentation
    /// scores are sensitive to this cap so it cannot be changed independently of the Bayes
    /// factor threshold.
    #[arg(hide = true, long, default_value_t = 5000.0)]
    pub max_concentration: f64,

    /// Count multiplier standing in for zero in the homozygous-deletion state
    #[arg(hide = true, long, default_value_t = 0.01)]
    pub zero_state_multiplier: f64,
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_call_settings(settings: CallSettings) -> SimpleResult<CallSettings> {
    if settings.counts_filename.is_empty() {
        bail!("Must specify counts file");
    }
    if !std::path::Path::new(&settings.counts_filename).exists() {
        bail!(
            "Can't find specified counts file: '{}'",
            settings.counts_filename
        );
    }

    if let Some(sample_regex) = &settings.sample_regex
        && let Err(e) = regex::Regex::new(sample_regex)
    {
        bail!("Invalid --samples regex '{sample_regex}': {e}");
    }

    if settings.min_reference_samples == 0 {
        bail!("--min-reference-samples argument must be greater than 0");
    }
    if settings.max_reference_samples < settings.min_reference_samples {
        bail!(
            "--max-reference-samples is set below the minimum reference set size of {}",
            settings.min_reference_samples
        );
    }
    if settings.min_bayes_factor <= 0.0 {
        bail!("--min-bayes-factor argument must be greater than 0");
    }
    if settings.max_concentration <= 1.0 {
        bail!("--max-concentration argument must be greater than 1");
    }
    if !(0.0 < settings.zero_state_multiplier && settings.zero_state_multiplier < 0.5) {
        bail!("--zero-state-multiplier argument must be between 0 and 0.5");
    }

    Ok(settings)
}

/// Write call settings out in json format
pub fn write_call_settings(output_dir: &Utf8Path, settings: &CallSettings) {
    use log::info;

    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing call settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create call settings json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &settings).unwrap();
}
