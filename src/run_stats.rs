//! Track stats for the whole CNV calling run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use unwrap::unwrap;

use crate::call_cnvs::RUN_STATS_FILENAME;

#[derive(Default, Deserialize, Serialize)]
pub struct SampleRunStats {
    pub sample_name: String,

    /// Set when the sample was skipped instead of called, with the reason
    pub skip_reason: Option<String>,

    pub reference_sample_count: usize,

    /// Count of exons excluded because no reference sample covers them
    pub degenerate_exon_count: usize,

    /// Count of exons excluded as too sparse to score
    pub sparse_exon_count: usize,

    pub scored_exon_count: usize,

    pub del_hom_call_count: usize,
    pub del_het_call_count: usize,
    pub dup_single_call_count: usize,
    pub dup_multi_call_count: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct CallRunStats {
    pub cohort_sample_count: usize,

    /// Count of cohort samples selected for calling
    pub test_sample_count: usize,

    pub skipped_sample_count: usize,
    pub total_call_count: usize,

    pub samples: Vec<SampleRunStats>,
}

/// Write run_stats structure out in json format
pub fn write_call_run_stats(output_dir: &Utf8Path, run_stats: &CallRunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    serde_json::to_writer_pretty(&f, &run_stats).unwrap();
}
