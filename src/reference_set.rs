use std::fmt;

use crate::cli::CallSettings;
use crate::count_matrix::ReadCountMatrix;

/// Calling failure isolated to one test sample
///
/// These do not abort the run, the affected sample is skipped and reported in the run summary.
///
#[derive(Debug, PartialEq)]
pub enum SampleCallError {
    /// Too few correlated cohort samples exist to form a baseline for the test sample
    InsufficientReferenceSamples {
        candidate_count: usize,
        min_reference_samples: usize,
    },
}

impl fmt::Display for SampleCallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SampleCallError::InsufficientReferenceSamples {
                candidate_count,
                min_reference_samples,
            } => {
                write!(
                    f,
                    "insufficient reference samples: {candidate_count} eligible candidates, {min_reference_samples} required"
                )
            }
        }
    }
}

impl std::error::Error for SampleCallError {}

#[derive(Debug)]
pub struct ReferenceSample {
    pub sample_index: usize,
    pub correlation: f64,
}

/// The cohort subset used as the read-depth baseline for one test sample
///
/// Recomputed per test sample and discarded after use.
///
#[derive(Debug)]
pub struct ReferenceSet {
    /// Reference samples ordered by correlation descending, then sample index
    pub samples: Vec<ReferenceSample>,
}

impl ReferenceSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_indexes(&self) -> impl Iterator<Item = usize> {
        self.samples.iter().map(|x| x.sample_index)
    }
}

/// Pearson correlation between two equal-length observation vectors
///
/// Returns None when either vector has zero variance, such candidates carry no usable
/// correlation signal.
///
fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    assert_eq!(a.len(), b.len());
    let n = a.len() as f64;
    if a.is_empty() {
        return None;
    }

    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&xa, &xb) in a.iter().zip(b.iter()) {
        let da = xa - mean_a;
        let db = xb - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a <= 0.0 || var_b <= 0.0 {
        None
    } else {
        Some(cov / (var_a.sqrt() * var_b.sqrt()))
    }
}

/// Select the reference set for one test sample
///
/// Every other cohort sample is a candidate. Candidates are ranked by Pearson correlation of
/// per-exon count proportions with the test sample, and the top candidates are kept up to the
/// configured ceiling. Pure function of the count matrix.
///
pub fn select_reference_set(
    matrix: &ReadCountMatrix,
    test_sample_index: usize,
    settings: &CallSettings,
) -> Result<ReferenceSet, SampleCallError> {
    let exon_count = matrix.exon_count();
    let get_proportions = |sample_index: usize| {
        (0..exon_count)
            .map(|exon_index| matrix.proportion(sample_index, exon_index))
            .collect::<Vec<_>>()
    };

    let test_proportions = get_proportions(test_sample_index);

    let mut candidates = Vec::new();
    for sample_index in 0..matrix.sample_count() {
        if sample_index == test_sample_index {
            continue;
        }
        if let Some(correlation) =
            pearson_correlation(&test_proportions, &get_proportions(sample_index))
        {
            candidates.push(ReferenceSample {
                sample_index,
                correlation,
            });
        }
    }

    if candidates.len() < settings.min_reference_samples {
        return Err(SampleCallError::InsufficientReferenceSamples {
            candidate_count: candidates.len(),
            min_reference_samples: settings.min_reference_samples,
        });
    }

    // Deterministic ranking: correlation descending, sample index breaks exact ties
    candidates.sort_by(|a, b| {
        b.correlation
            .partial_cmp(&a.correlation)
            .unwrap()
            .then(a.sample_index.cmp(&b.sample_index))
    });
    candidates.truncate(settings.max_reference_samples);

    Ok(ReferenceSet {
        samples: candidates,
    })
}
