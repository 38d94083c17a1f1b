use statrs::statistics::Statistics;

use crate::count_matrix::ReadCountMatrix;
use crate::reference_set::ReferenceSet;

/// Lower clamp for the method-of-moments concentration estimate
///
/// Reference sets more dispersed than this produce unstable moment estimates, treating them
/// as maximally dispersed keeps the likelihood well defined.
const MIN_CONCENTRATION: f64 = 1.0;

/// Beta-binomial fit result for one exon
///
/// Degenerate exons have no coverage in any reference sample and are excluded from scoring
/// for this test sample rather than failing the run.
///
pub enum ExonFit {
    Degenerate,
    Fit(ExonModel),
}

/// Expected read-count behavior at one exon under the normal copy-number state
///
pub struct ExonModel {
    /// Mean fraction of a reference sample's total reads falling in this exon
    pub expected_proportion: f64,

    /// Beta concentration (alpha + beta) capturing across-sample dispersion at this exon
    pub concentration: f64,
}

/// Fit the per-exon beta-binomial parameters from the reference set
///
/// The expected proportion is the mean of the reference samples' per-exon proportions. The
/// concentration comes from the across-reference variance by method of moments, clamped to
/// the configured maximum so that a zero-variance reference set never produces a singular
/// likelihood.
///
pub fn fit_exon_model(
    matrix: &ReadCountMatrix,
    reference_set: &ReferenceSet,
    exon_index: usize,
    max_concentration: f64,
) -> ExonFit {
    assert!(max_concentration > MIN_CONCENTRATION);

    let proportions = reference_set
        .sample_indexes()
        .map(|sample_index| matrix.proportion(sample_index, exon_index))
        .collect::<Vec<_>>();

    let mean = proportions.as_slice().mean();
    if mean <= 0.0 {
        return ExonFit::Degenerate;
    }

    let variance = proportions.as_slice().variance();
    let concentration = if variance > 0.0 {
        (mean * (1.0 - mean) / variance - 1.0).clamp(MIN_CONCENTRATION, max_concentration)
    } else {
        max_concentration
    };

    ExonFit::Fit(ExonModel {
        expected_proportion: mean,
        concentration,
    })
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use super::*;
    use crate::cli::CallSettings;
    use crate::reference_set::select_reference_set;

    fn get_test_matrix(content: &str) -> ReadCountMatrix {
        ReadCountMatrix::from_reader(BufReader::new(content.as_bytes()), "test").unwrap()
    }

    fn get_full_reference_set(matrix: &ReadCountMatrix) -> ReferenceSet {
        let settings = CallSettings {
            min_reference_samples: 1,
            max_reference_samples: matrix.sample_count(),
            ..Default::default()
        };
        select_reference_set(matrix, 0, &settings).unwrap()
    }

    #[test]
    fn test_fit_exon_model() {
        // References r1/r2 have totals 100 with exon e1 proportions 0.2 and 0.4
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ttest\tr1\tr2
chr1\t100\t200\te1\t10\t20\t40
chr1\t300\t400\te2\t90\t80\t60
";
        let matrix = get_test_matrix(content);
        let reference_set = get_full_reference_set(&matrix);

        let model = match fit_exon_model(&matrix, &reference_set, 0, 5000.0) {
            ExonFit::Fit(x) => x,
            ExonFit::Degenerate => panic!("unexpected degenerate fit"),
        };
        approx::assert_ulps_eq!(model.expected_proportion, 0.3, max_ulps = 4);

        // Sample variance of {0.2, 0.4} is 0.02, moments give 0.3 * 0.7 / 0.02 - 1 = 9.5
        approx::assert_ulps_eq!(model.concentration, 9.5, max_ulps = 4);
    }

    #[test]
    fn test_fit_zero_variance_caps_concentration() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ttest\tr1\tr2
chr1\t100\t200\te1\t10\t20\t20
chr1\t300\t400\te2\t90\t80\t80
";
        let matrix = get_test_matrix(content);
        let reference_set = get_full_reference_set(&matrix);

        let model = match fit_exon_model(&matrix, &reference_set, 0, 5000.0) {
            ExonFit::Fit(x) => x,
            ExonFit::Degenerate => panic!("unexpected degenerate fit"),
        };
        approx::assert_ulps_eq!(model.concentration, 5000.0, max_ulps = 4);
    }

    #[test]
    fn test_fit_uncovered_exon_is_degenerate() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ttest\tr1\tr2
chr1\t100\t200\te1\t0\t0\t0
chr1\t300\t400\te2\t90\t80\t60
";
        let matrix = get_test_matrix(content);
        let reference_set = get_full_reference_set(&matrix);
        assert!(matches!(
            fit_exon_model(&matrix, &reference_set, 0, 5000.0),
            ExonFit::Degenerate
        ));
    }
}
