use std::collections::HashMap;

/// Chromosome names in counts-file order
///
/// The order of first appearance in the counts file defines the chromosome index used
/// throughout, so the genomic sort order of all downstream results is reproducible from the
/// input alone.
///
#[derive(Clone, Debug, Default)]
pub struct ChromList {
    pub labels: Vec<String>,
    label_to_index: HashMap<String, usize>,
}

impl ChromList {
    /// Add a chromosome label if novel, returning its index either way
    pub fn add_chrom(&mut self, label: &str) -> usize {
        match self.label_to_index.get(label) {
            Some(&index) => index,
            None => {
                let index = self.labels.len();
                self.labels.push(label.to_string());
                self.label_to_index.insert(label.to_string(), index);
                index
            }
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// One padded exon interval from the counts file
///
/// Coordinates follow the bed convention: 0-indexed, half-open. The derived ordering is the
/// genomic total order used throughout: chromosome index, then start, then end.
///
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExonInterval {
    pub chrom_index: usize,
    pub start: i64,
    pub end: i64,
    pub exon_id: String,
}

impl ExonInterval {
    pub fn to_region_str(&self, chrom_list: &ChromList) -> String {
        let chrom = &chrom_list.labels[self.chrom_index];
        format!("{chrom}:{}-{}", self.start + 1, self.end)
    }
}

/// Strict order here means that `a` comes before `b` without intersection
///
pub fn is_strict_order(a: &ExonInterval, b: &ExonInterval) -> bool {
    a.chrom_index < b.chrom_index || (a.chrom_index == b.chrom_index && a.end <= b.start)
}
