//! Top-level CNV calling workflow
//!
//! Samples are called independently against their own reference baselines, so the cohort is
//! processed as a worker pool of sequential per-sample tasks over the shared read-only count
//! matrix.
//!

use std::sync::mpsc::channel;

use log::{info, warn};
use simple_error::{SimpleResult, bail};
use thousands::Separable;
use unwrap::unwrap;

use crate::cli::{CallSettings, SharedSettings, write_call_settings};
use crate::cnv_output::write_cnv_calls;
use crate::cnv_segmentation::{CnvCall, call_chrom_segments};
use crate::count_matrix::ReadCountMatrix;
use crate::exon_model::{ExonFit, fit_exon_model};
use crate::reference_set::{SampleCallError, select_reference_set};
use crate::run_stats::{CallRunStats, SampleRunStats, write_call_run_stats};
use crate::state_likelihood::{CopyNumberState, score_exon};

pub const SETTINGS_FILENAME: &str = "call.settings.json";
pub const CNV_CALLS_FILENAME: &str = "cnv.calls.tsv";
pub const RUN_STATS_FILENAME: &str = "run.stats.json";

/// Calling outcome for one test sample
pub struct SampleCallResult {
    pub reference_sample_count: usize,
    pub degenerate_exon_count: usize,
    pub sparse_exon_count: usize,
    pub scored_exon_count: usize,

    /// Calls in genomic order, non-overlapping, never crossing a chromosome boundary
    pub calls: Vec<CnvCall>,
}

/// Call CNVs for one test sample over the whole genome
///
/// Runs the full per-sample workflow: reference-set selection, per-exon model fitting and
/// state scoring, then per-chromosome segmentation of the scored exons.
///
pub fn call_sample_cnvs(
    matrix: &ReadCountMatrix,
    test_sample_index: usize,
    settings: &CallSettings,
) -> Result<SampleCallResult, SampleCallError> {
    let reference_set = select_reference_set(matrix, test_sample_index, settings)?;
    let sample_total = matrix.sample_totals[test_sample_index];

    let mut degenerate_exon_count = 0;
    let mut sparse_exon_count = 0;
    let mut scored_exon_count = 0;
    let mut calls = Vec::new();

    for exon_range in matrix.chrom_exon_ranges() {
        let chrom_index = matrix.intervals[exon_range.start].chrom_index;

        let mut scores = Vec::new();
        for exon_index in exon_range {
            let model = match fit_exon_model(
                matrix,
                &reference_set,
                exon_index,
                settings.max_concentration,
            ) {
                ExonFit::Fit(x) => x,
                ExonFit::Degenerate => {
                    degenerate_exon_count += 1;
                    continue;
                }
            };

            match score_exon(
                exon_index,
                matrix.counts[test_sample_index][exon_index],
                sample_total,
                &model,
                settings,
            ) {
                Some(x) => scores.push(x),
                None => {
                    sparse_exon_count += 1;
                }
            }
        }
        scored_exon_count += scores.len();

        calls.extend(call_chrom_segments(
            test_sample_index,
            chrom_index,
            &scores,
            settings,
        ));
    }

    Ok(SampleCallResult {
        reference_sample_count: reference_set.len(),
        degenerate_exon_count,
        sparse_exon_count,
        scored_exon_count,
        calls,
    })
}

/// Call CNVs for all selected test samples on a worker pool
///
/// Results are returned in sample-index order regardless of worker scheduling. Per-sample
/// failures are returned alongside the successes, they never abort the other samples.
///
fn call_all_samples(
    matrix: &ReadCountMatrix,
    test_sample_indexes: &[usize],
    settings: &CallSettings,
    thread_count: usize,
) -> Vec<(usize, Result<SampleCallResult, SampleCallError>)> {
    let worker_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .unwrap();

    let (tx, rx) = channel();
    worker_pool.scope(move |scope| {
        for &sample_index in test_sample_indexes {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = call_sample_cnvs(matrix, sample_index, settings);
                tx.send((sample_index, result)).unwrap();
            });
        }
    });

    let mut results = rx.into_iter().collect::<Vec<_>>();
    results.sort_by_key(|(sample_index, _)| *sample_index);
    results
}

/// Resolve the test-sample selection regex to matrix sample indexes
///
fn get_test_sample_indexes(
    matrix: &ReadCountMatrix,
    settings: &CallSettings,
) -> SimpleResult<Vec<usize>> {
    let sample_regex = match &settings.sample_regex {
        Some(x) => x,
        None => return Ok((0..matrix.sample_count()).collect()),
    };

    // Already validated at startup
    let re = unwrap!(
        regex::Regex::new(sample_regex),
        "Invalid sample selection regex '{sample_regex}'"
    );

    let selected = (0..matrix.sample_count())
        .filter(|&sample_index| re.is_match(&matrix.sample_names[sample_index]))
        .collect::<Vec<_>>();

    if selected.is_empty() {
        bail!("Sample selection regex '{sample_regex}' does not match any sample in the counts file");
    }
    Ok(selected)
}

/// Sort calls into the deterministic emission order: genomic position, then sample id
///
/// The sample key is the sample name, not the counts-file column index, so emission order is
/// independent of how the cohort columns happen to be arranged.
///
fn sort_calls_for_emission(matrix: &ReadCountMatrix, calls: &mut [CnvCall]) {
    let call_key = |call: &CnvCall| {
        (
            call.chrom_index,
            matrix.intervals[call.begin_exon].start,
            matrix.intervals[call.end_exon].end,
            &matrix.sample_names[call.sample_index],
        )
    };
    calls.sort_by(|a, b| call_key(a).cmp(&call_key(b)));
}

fn get_sample_run_stats(sample_name: String, result: &SampleCallResult) -> SampleRunStats {
    let mut stats = SampleRunStats {
        sample_name,
        skip_reason: None,
        reference_sample_count: result.reference_sample_count,
        degenerate_exon_count: result.degenerate_exon_count,
        sparse_exon_count: result.sparse_exon_count,
        scored_exon_count: result.scored_exon_count,
        ..Default::default()
    };
    for call in &result.calls {
        use CopyNumberState::*;
        match call.state {
            DelHom => stats.del_hom_call_count += 1,
            DelHet => stats.del_het_call_count += 1,
            DupSingle => stats.dup_single_call_count += 1,
            DupMulti => stats.dup_multi_call_count += 1,
            Normal => {}
        }
    }
    stats
}

/// Run the CNV calling workflow
///
pub fn run_call(shared_settings: &SharedSettings, settings: &CallSettings) -> SimpleResult<()> {
    let output_dir = &settings.output_dir;
    write_call_settings(output_dir, settings);

    let matrix = ReadCountMatrix::from_tsv_filename(&settings.counts_filename)?;

    let test_sample_indexes = get_test_sample_indexes(&matrix, settings)?;
    info!(
        "Calling CNVs for {} of {} cohort samples",
        test_sample_indexes.len().separate_with_commas(),
        matrix.sample_count().separate_with_commas()
    );

    let results = call_all_samples(
        &matrix,
        &test_sample_indexes,
        settings,
        shared_settings.thread_count,
    );

    let mut all_calls = Vec::new();
    let mut sample_stats = Vec::new();
    let mut skipped_sample_count = 0;
    for (sample_index, result) in results {
        let sample_name = matrix.sample_names[sample_index].clone();
        match result {
            Ok(result) => {
                sample_stats.push(get_sample_run_stats(sample_name, &result));
                all_calls.extend(result.calls);
            }
            Err(error) => {
                warn!("Skipping sample '{sample_name}': {error}");
                skipped_sample_count += 1;
                sample_stats.push(SampleRunStats {
                    sample_name,
                    skip_reason: Some(error.to_string()),
                    ..Default::default()
                });
            }
        }
    }

    sort_calls_for_emission(&matrix, &mut all_calls);

    write_cnv_calls(output_dir, &matrix, &all_calls);

    let run_stats = CallRunStats {
        cohort_sample_count: matrix.sample_count(),
        test_sample_count: test_sample_indexes.len(),
        skipped_sample_count,
        total_call_count: all_calls.len(),
        samples: sample_stats,
    };
    write_call_run_stats(output_dir, &run_stats);

    info!(
        "Emitted {} CNV calls from {} samples",
        run_stats.total_call_count.separate_with_commas(),
        (run_stats.test_sample_count - run_stats.skipped_sample_count).separate_with_commas()
    );

    Ok(())
}
