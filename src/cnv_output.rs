use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use itertools::Itertools;
use log::info;
use thousands::Separable;
use unwrap::unwrap;

use crate::call_cnvs::CNV_CALLS_FILENAME;
use crate::cnv_segmentation::CnvCall;
use crate::count_matrix::ReadCountMatrix;
use crate::prob_utils::ln_bayes_factor_to_sci;

const CNV_CALLS_HEADER: [&str; 7] = [
    "SAMPLE",
    "CHR",
    "START",
    "END",
    "STATE",
    "BAYES_FACTOR",
    "DEPTH_RATIOS",
];

/// Format an aggregate Bayes factor held in log space
///
/// Scientific notation is composed directly from the log-space value, so factors far past
/// f64 range still format correctly.
///
fn format_bayes_factor(ln_bayes_factor: f64) -> String {
    let (mantissa, exponent) = ln_bayes_factor_to_sci(ln_bayes_factor);
    format!("{mantissa:.4}e{exponent}")
}

fn format_depth_ratios(depth_ratios: &[f64]) -> String {
    depth_ratios.iter().map(|x| format!("{x:.3}")).join(",")
}

fn get_cnv_call_record(matrix: &ReadCountMatrix, call: &CnvCall) -> String {
    let begin_interval = &matrix.intervals[call.begin_exon];
    let end_interval = &matrix.intervals[call.end_exon];
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        matrix.sample_names[call.sample_index],
        matrix.chrom_list.labels[call.chrom_index],
        begin_interval.start,
        end_interval.end,
        call.state.label(),
        format_bayes_factor(call.ln_bayes_factor),
        format_depth_ratios(&call.depth_ratios),
    )
}

/// Write all CNV calls out as a tsv table
///
/// Calls are written in the order given, the caller is responsible for the genomic-position
/// then sample-id sort.
///
pub fn write_cnv_calls(output_dir: &Utf8Path, matrix: &ReadCountMatrix, calls: &[CnvCall]) {
    let filename = output_dir.join(CNV_CALLS_FILENAME);

    info!(
        "Writing {} CNV calls to file: '{filename}'",
        calls.len().separate_with_commas()
    );

    let f = unwrap!(
        File::create(&filename),
        "Unable to create CNV call file: '{filename}'"
    );
    let mut f = BufWriter::new(f);

    let mut write_record = |record: &str| {
        unwrap!(
            writeln!(f, "{record}"),
            "Unable to write to CNV call file: '{filename}'"
        );
    };

    write_record(&CNV_CALLS_HEADER.join("\t"));
    for call in calls {
        write_record(&get_cnv_call_record(matrix, call));
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;

    use super::*;
    use crate::state_likelihood::CopyNumberState;

    #[test]
    fn test_format_bayes_factor() {
        assert_eq!(format_bayes_factor(250.0f64.ln()), "2.5000e2");
        assert_eq!(format_bayes_factor(2.5f64.ln()), "2.5000e0");

        // A log-space factor well beyond f64 range still formats
        assert!(format_bayes_factor(2000.0).ends_with("e868"));
    }

    #[test]
    fn test_format_depth_ratios() {
        assert_eq!(format_depth_ratios(&[0.5, 1.0, 1.4999]), "0.500,1.000,1.500");
    }

    #[test]
    fn test_get_cnv_call_record() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1\ts2
chr1\t100\t200\te1\t10\t20
chr1\t300\t400\te2\t30\t40
chr1\t500\t600\te3\t50\t60
";
        let matrix =
            ReadCountMatrix::from_reader(BufReader::new(content.as_bytes()), "test").unwrap();

        let call = CnvCall {
            sample_index: 1,
            chrom_index: 0,
            begin_exon: 0,
            end_exon: 1,
            state: CopyNumberState::DelHet,
            ln_bayes_factor: 250.0f64.ln(),
            depth_ratios: vec![0.5, 0.55],
        };
        assert_eq!(
            get_cnv_call_record(&matrix, &call),
            "s2\tchr1\t100\t400\tDEL_HET\t2.5000e2\t0.500,0.550"
        );
    }
}
