use std::fs::File;
use std::io::{BufRead, BufReader};

use flate2::read::MultiGzDecoder;
use log::info;
use simple_error::{SimpleResult, bail};
use thousands::Separable;

use crate::exon_interval::{ChromList, ExonInterval, is_strict_order};

/// Expected key columns at the start of the counts file header, before the sample columns
const KEY_COLUMNS: [&str; 4] = ["CHR", "START", "END", "EXON_ID"];

/// Read counts for all samples over all exon intervals
///
/// Built once per run from the upstream counts file and read-only thereafter. Every sample has
/// a count for every interval, and intervals are sorted and non-overlapping in genomic order;
/// both invariants are enforced at parse time.
///
#[derive(Debug)]
pub struct ReadCountMatrix {
    pub chrom_list: ChromList,

    /// Exon intervals in counts-file (genomic) order
    pub intervals: Vec<ExonInterval>,

    pub sample_names: Vec<String>,

    /// Read counts indexed as `counts[sample_index][exon_index]`
    pub counts: Vec<Vec<u64>>,

    /// Total read count per sample over all exons
    pub sample_totals: Vec<u64>,
}

impl ReadCountMatrix {
    pub fn sample_count(&self) -> usize {
        self.sample_names.len()
    }

    pub fn exon_count(&self) -> usize {
        self.intervals.len()
    }

    /// Fraction of the sample's total reads falling in the given exon
    pub fn proportion(&self, sample_index: usize, exon_index: usize) -> f64 {
        let total = self.sample_totals[sample_index];
        if total == 0 {
            0.0
        } else {
            self.counts[sample_index][exon_index] as f64 / total as f64
        }
    }

    /// Exon index ranges for each chromosome, in chromosome order
    ///
    /// Intervals for one chromosome are contiguous in the counts file, so each chromosome maps
    /// to one half-open range of exon indexes.
    ///
    pub fn chrom_exon_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut ranges: Vec<std::ops::Range<usize>> = Vec::new();
        for (exon_index, interval) in self.intervals.iter().enumerate() {
            match ranges.last_mut() {
                Some(range) if self.intervals[range.start].chrom_index == interval.chrom_index => {
                    range.end = exon_index + 1;
                }
                _ => {
                    ranges.push(exon_index..exon_index + 1);
                }
            }
        }
        ranges
    }

    /// Read the count matrix from a counts tsv file, gzip-compressed or not per file extension
    ///
    pub fn from_tsv_filename(filename: &str) -> SimpleResult<Self> {
        info!("Reading exon read counts from file: '{filename}'");

        let file = match File::open(filename) {
            Ok(x) => x,
            Err(e) => bail!("Unable to open counts file '{filename}': {e}"),
        };

        let matrix = if filename.ends_with(".gz") {
            Self::from_reader(BufReader::new(MultiGzDecoder::new(file)), filename)?
        } else {
            Self::from_reader(BufReader::new(file), filename)?
        };

        info!(
            "Read counts for {} samples over {} exons",
            matrix.sample_count().separate_with_commas(),
            matrix.exon_count().separate_with_commas()
        );
        Ok(matrix)
    }

    /// Parse the count matrix from tsv content
    ///
    /// Any structural problem with the input is fatal to the whole run, the error message
    /// identifies the offending row and column.
    ///
    pub fn from_reader<R: BufRead>(reader: R, source_label: &str) -> SimpleResult<Self> {
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(Ok(x)) => x,
            Some(Err(e)) => bail!("Unable to read counts file '{source_label}': {e}"),
            None => bail!("Counts file '{source_label}' is empty"),
        };

        let sample_names = parse_header(&header, source_label)?;
        let sample_count = sample_names.len();

        let mut chrom_list = ChromList::default();
        let mut intervals: Vec<ExonInterval> = Vec::new();
        let mut counts = vec![Vec::new(); sample_count];

        for (line_index, line) in lines.enumerate() {
            // Header is line 1, so the first data row is line 2
            let line_number = line_index + 2;
            let line = match line {
                Ok(x) => x,
                Err(e) => bail!("Unable to read counts file '{source_label}': {e}"),
            };
            if line.is_empty() {
                continue;
            }

            let fields = line.split('\t').collect::<Vec<_>>();
            if fields.len() != KEY_COLUMNS.len() + sample_count {
                bail!(
                    "Counts file '{source_label}' line {line_number}: expected {} columns but found {}",
                    KEY_COLUMNS.len() + sample_count,
                    fields.len()
                );
            }

            let interval = parse_interval_fields(
                &mut chrom_list,
                &fields[..KEY_COLUMNS.len()],
                source_label,
                line_number,
            )?;

            if let Some(last) = intervals.last() {
                if last.chrom_index != interval.chrom_index {
                    // A chromosome change is only valid when the chromosome is novel
                    if interval.chrom_index + 1 != chrom_list.len() {
                        bail!(
                            "Counts file '{source_label}' line {line_number}: chromosome '{}' intervals are not grouped together",
                            chrom_list.labels[interval.chrom_index]
                        );
                    }
                } else if !is_strict_order(last, &interval) {
                    bail!(
                        "Counts file '{source_label}' line {line_number}: interval {} is not sorted after (or overlaps) the previous interval",
                        interval.to_region_str(&chrom_list)
                    );
                }
            }

            for (sample_index, count_str) in fields[KEY_COLUMNS.len()..].iter().enumerate() {
                let count = match count_str.parse::<u64>() {
                    Ok(x) => x,
                    Err(_) => bail!(
                        "Counts file '{source_label}' line {line_number}: sample '{}' count '{count_str}' is not a non-negative integer",
                        sample_names[sample_index]
                    ),
                };
                counts[sample_index].push(count);
            }
            intervals.push(interval);
        }

        if intervals.is_empty() {
            bail!("Counts file '{source_label}' contains no intervals");
        }

        let sample_totals = counts.iter().map(|x| x.iter().sum()).collect::<Vec<_>>();

        Ok(Self {
            chrom_list,
            intervals,
            sample_names,
            counts,
            sample_totals,
        })
    }
}

fn parse_header(header: &str, source_label: &str) -> SimpleResult<Vec<String>> {
    let fields = header.split('\t').collect::<Vec<_>>();
    if fields.len() < KEY_COLUMNS.len() + 1 {
        bail!(
            "Counts file '{source_label}' header must contain the {} key columns followed by at least one sample column",
            KEY_COLUMNS.len()
        );
    }
    for (field, expected) in fields.iter().zip(KEY_COLUMNS.iter()) {
        if field != expected {
            bail!(
                "Counts file '{source_label}' header: expected key column '{expected}' but found '{field}'"
            );
        }
    }

    let sample_names = fields[KEY_COLUMNS.len()..]
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>();

    for (index, name) in sample_names.iter().enumerate() {
        if name.is_empty() {
            bail!("Counts file '{source_label}' header: empty sample name");
        }
        if sample_names[..index].contains(name) {
            bail!("Counts file '{source_label}' header: duplicate sample name '{name}'");
        }
    }
    Ok(sample_names)
}

fn parse_interval_fields(
    chrom_list: &mut ChromList,
    fields: &[&str],
    source_label: &str,
    line_number: usize,
) -> SimpleResult<ExonInterval> {
    let chrom_index = chrom_list.add_chrom(fields[0]);
    let start = match fields[1].parse::<i64>() {
        Ok(x) if x >= 0 => x,
        _ => bail!(
            "Counts file '{source_label}' line {line_number}: invalid interval start '{}'",
            fields[1]
        ),
    };
    let end = match fields[2].parse::<i64>() {
        Ok(x) if x > start => x,
        _ => bail!(
            "Counts file '{source_label}' line {line_number}: invalid interval end '{}'",
            fields[2]
        ),
    };
    Ok(ExonInterval {
        chrom_index,
        start,
        end,
        exon_id: fields[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_test_matrix(content: &str) -> SimpleResult<ReadCountMatrix> {
        ReadCountMatrix::from_reader(BufReader::new(content.as_bytes()), "test")
    }

    #[test]
    fn test_parse_counts() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1\ts2
chr1\t100\t200\te1\t10\t20
chr1\t300\t400\te2\t30\t40
chr2\t100\t200\te3\t50\t60
";
        let matrix = parse_test_matrix(content).unwrap();
        assert_eq!(matrix.sample_count(), 2);
        assert_eq!(matrix.exon_count(), 3);
        assert_eq!(matrix.sample_names, vec!["s1", "s2"]);
        assert_eq!(matrix.counts[0], vec![10, 30, 50]);
        assert_eq!(matrix.sample_totals, vec![90, 120]);
        assert_eq!(matrix.chrom_list.labels, vec!["chr1", "chr2"]);
        assert_eq!(matrix.chrom_exon_ranges(), vec![0..2, 2..3]);
        approx::assert_ulps_eq!(matrix.proportion(1, 0), 20.0 / 120.0, max_ulps = 4);
    }

    #[test]
    fn test_parse_counts_rejects_negative_count() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1
chr1\t100\t200\te1\t-5
";
        let error = parse_test_matrix(content).unwrap_err();
        assert!(error.to_string().contains("line 2"));
        assert!(error.to_string().contains("s1"));
    }

    #[test]
    fn test_parse_counts_rejects_short_row() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1\ts2
chr1\t100\t200\te1\t10
";
        let error = parse_test_matrix(content).unwrap_err();
        assert!(error.to_string().contains("expected 6 columns"));
    }

    #[test]
    fn test_parse_counts_rejects_unsorted_intervals() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1
chr1\t300\t400\te1\t10
chr1\t100\t200\te2\t10
";
        assert!(parse_test_matrix(content).is_err());
    }

    #[test]
    fn test_parse_counts_rejects_overlapping_intervals() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1
chr1\t100\t200\te1\t10
chr1\t150\t250\te2\t10
";
        assert!(parse_test_matrix(content).is_err());
    }

    #[test]
    fn test_parse_counts_rejects_duplicate_sample() {
        let content = "\
CHR\tSTART\tEND\tEXON_ID\ts1\ts1
chr1\t100\t200\te1\t10\t10
";
        assert!(parse_test_matrix(content).is_err());
    }

    #[test]
    fn test_parse_counts_rejects_bad_header() {
        let content = "\
chrom\tSTART\tEND\tEXON_ID\ts1
chr1\t100\t200\te1\t10
";
        assert!(parse_test_matrix(content).is_err());
    }
}
