use std::cmp::Ordering;

use crate::cli::CallSettings;
use crate::state_likelihood::{CopyNumberState, ExonScore};

/// One called copy-number variant for a single sample
///
/// Exon bounds are inclusive indexes into the matrix interval list, always within one
/// chromosome.
///
#[derive(Clone, Debug)]
pub struct CnvCall {
    pub sample_index: usize,
    pub chrom_index: usize,
    pub begin_exon: usize,
    pub end_exon: usize,
    pub state: CopyNumberState,

    /// Aggregate log Bayes factor of the call state versus normal over all scored exons in
    /// the segment
    pub ln_bayes_factor: f64,

    /// Observed/expected depth ratio for each scored exon in the segment
    pub depth_ratios: Vec<f64>,
}

/// A candidate segment in scored-exon index space, before threshold filtering and
/// cross-state overlap resolution
///
struct SegmentCandidate {
    state: CopyNumberState,

    /// Inclusive bounds, indexing the chromosome's scored-exon list
    begin: usize,
    end: usize,

    score: f64,
}

impl SegmentCandidate {
    fn span(&self) -> usize {
        self.end + 1 - self.begin
    }

    fn intersect(&self, other: &SegmentCandidate) -> bool {
        self.begin <= other.end && other.begin <= self.end
    }
}

/// Candidate segment priority for overlap resolution
///
/// Higher aggregate Bayes factor wins, exact ties prefer the shorter (more specific) segment,
/// then the lower start index, then the state index for full determinism.
///
fn compare_candidates(a: &SegmentCandidate, b: &SegmentCandidate) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap()
        .then(a.span().cmp(&b.span()))
        .then(a.begin.cmp(&b.begin))
        .then((a.state as usize).cmp(&(b.state as usize)))
}

/// Find all positive-score runs of one non-normal state over one chromosome's scored exons
///
/// Maximum-subarray scan over the per-exon log Bayes factors for the state: a segment is
/// extended while extension keeps its running score positive, restarted when the score would
/// be higher starting fresh, and closed out once the running score drops to zero or below or
/// genomic continuity breaks. Unscored exons lying between two scored neighbors break a
/// segment when they outnumber the configured gap allowance.
///
fn find_state_segments(
    scores: &[ExonScore],
    state: CopyNumberState,
    max_call_gap: usize,
) -> Vec<SegmentCandidate> {
    let mut segments = Vec::new();
    let mut best: Option<SegmentCandidate> = None;
    let mut run_begin = 0;
    let mut running = 0f64;

    for (scored_index, exon_score) in scores.iter().enumerate() {
        if scored_index > 0 {
            let gap = exon_score.exon_index - scores[scored_index - 1].exon_index - 1;
            if gap > max_call_gap {
                segments.extend(best.take());
                running = 0.0;
            }
        }

        let ln_bf = exon_score.ln_bayes_factor(state);
        assert!(ln_bf.is_finite());
        if running <= 0.0 {
            run_begin = scored_index;
            running = ln_bf;
        } else {
            running += ln_bf;
        }

        if running <= 0.0 {
            // Extension is no longer beneficial, close out the best run seen so far
            segments.extend(best.take());
            running = 0.0;
        } else if best.as_ref().is_none_or(|x| running > x.score) {
            best = Some(SegmentCandidate {
                state,
                begin: run_begin,
                end: scored_index,
                score: running,
            });
        }
    }
    segments.extend(best);

    segments
}

/// Call CNV segments for one sample over one chromosome
///
/// Candidate segments are generated independently per non-normal state, filtered against the
/// Bayes-factor emission threshold, and reduced to a non-overlapping call set by priority
/// order. Returned calls are in genomic order.
///
pub fn call_chrom_segments(
    sample_index: usize,
    chrom_index: usize,
    scores: &[ExonScore],
    settings: &CallSettings,
) -> Vec<CnvCall> {
    let min_ln_bayes_factor = settings.min_bayes_factor.ln();

    let mut candidates = Vec::new();
    for state in CopyNumberState::non_normal_states() {
        candidates.extend(
            find_state_segments(scores, state, settings.max_call_gap)
                .into_iter()
                .filter(|x| x.score >= min_ln_bayes_factor),
        );
    }
    candidates.sort_by(compare_candidates);

    let mut accepted: Vec<SegmentCandidate> = Vec::new();
    for candidate in candidates {
        if !accepted.iter().any(|x| x.intersect(&candidate)) {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|x| x.begin);

    accepted
        .into_iter()
        .map(|x| CnvCall {
            sample_index,
            chrom_index,
            begin_exon: scores[x.begin].exon_index,
            end_exon: scores[x.end].exon_index,
            state: x.state,
            ln_bayes_factor: x.score,
            depth_ratios: scores[x.begin..=x.end]
                .iter()
                .map(|score| score.depth_ratio)
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use strum::EnumCount;

    use super::*;

    /// Build a score entry directly from per-state log Bayes factors
    fn make_score(exon_index: usize, ln_bfs: &[(CopyNumberState, f64)]) -> ExonScore {
        let mut state_lnliks = [0.0; CopyNumberState::COUNT];
        for &(state, ln_bf) in ln_bfs {
            state_lnliks[state as usize] = ln_bf;
        }
        ExonScore {
            exon_index,
            state_lnliks,
            depth_ratio: 1.0,
        }
    }

    fn get_test_settings() -> CallSettings {
        CallSettings {
            min_bayes_factor: 10.0,
            max_call_gap: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_duplication_run() {
        use CopyNumberState::*;
        let scores = (0..10)
            .map(|exon_index| {
                let ln_bf = if (3..=6).contains(&exon_index) { 3.0 } else { -2.0 };
                make_score(exon_index, &[(DupMulti, ln_bf), (DelHet, -4.0), (DelHom, -9.0)])
            })
            .collect::<Vec<_>>();

        let calls = call_chrom_segments(0, 0, &scores, &get_test_settings());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].state, DupMulti);
        assert_eq!((calls[0].begin_exon, calls[0].end_exon), (3, 6));
        approx::assert_ulps_eq!(calls[0].ln_bayes_factor, 12.0, max_ulps = 4);
        assert_eq!(calls[0].depth_ratios.len(), 4);
    }

    #[test]
    fn test_two_runs_split_by_negative_evidence() {
        use CopyNumberState::*;
        let ln_bfs = [4.0, 4.0, -20.0, 4.0, 4.0];
        let scores = ln_bfs
            .iter()
            .enumerate()
            .map(|(exon_index, &ln_bf)| make_score(exon_index, &[(DelHet, ln_bf)]))
            .collect::<Vec<_>>();

        let calls = call_chrom_segments(0, 0, &scores, &get_test_settings());
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].begin_exon, calls[0].end_exon), (0, 1));
        assert_eq!((calls[1].begin_exon, calls[1].end_exon), (3, 4));
    }

    #[test]
    fn test_gap_breaks_segment() {
        use CopyNumberState::*;
        // Exons 0,1 then 5,6 are scored; the 3 filtered exons in between break continuity
        let scores = [0, 1, 5, 6]
            .iter()
            .map(|&exon_index| make_score(exon_index, &[(DelHet, 2.0)]))
            .collect::<Vec<_>>();

        let settings = get_test_settings();
        let calls = call_chrom_segments(0, 0, &scores, &settings);
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].begin_exon, calls[0].end_exon), (0, 1));
        assert_eq!((calls[1].begin_exon, calls[1].end_exon), (5, 6));

        // With a large enough gap allowance the runs merge into one call
        let settings = CallSettings {
            max_call_gap: 3,
            ..get_test_settings()
        };
        let calls = call_chrom_segments(0, 0, &scores, &settings);
        assert_eq!(calls.len(), 1);
        assert_eq!((calls[0].begin_exon, calls[0].end_exon), (0, 6));
    }

    #[test]
    fn test_emission_threshold_filters_calls() {
        use CopyNumberState::*;
        let scores = (0..3)
            .map(|exon_index| make_score(exon_index, &[(DelHom, 0.5)]))
            .collect::<Vec<_>>();

        // Aggregate score 1.5 is below ln(10)
        let calls = call_chrom_segments(0, 0, &scores, &get_test_settings());
        assert!(calls.is_empty());

        // Lowering the threshold emits the call: threshold monotonicity
        let settings = CallSettings {
            min_bayes_factor: 1.5,
            ..get_test_settings()
        };
        let calls = call_chrom_segments(0, 0, &scores, &settings);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].ln_bayes_factor >= settings.min_bayes_factor.ln());
    }

    #[test]
    fn test_overlapping_states_resolved_by_bayes_factor() {
        use CopyNumberState::*;
        // DelHet and DelHom both have positive evidence over the same run, DelHet stronger
        let scores = (0..4)
            .map(|exon_index| make_score(exon_index, &[(DelHet, 3.0), (DelHom, 2.0)]))
            .collect::<Vec<_>>();

        let calls = call_chrom_segments(0, 0, &scores, &get_test_settings());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].state, DelHet);
    }

    #[test]
    fn test_exact_tie_prefers_shorter_segment() {
        use CopyNumberState::*;
        // DupSingle scores 4.0 on a single exon; DelHet spreads 2.0+2.0 over two exons for
        // the same aggregate score
        let scores = vec![
            make_score(0, &[(DelHet, 2.0)]),
            make_score(1, &[(DelHet, 2.0), (DupSingle, 4.0)]),
        ];

        let settings = CallSettings {
            min_bayes_factor: (4.0f64).exp(),
            ..get_test_settings()
        };
        let calls = call_chrom_segments(0, 0, &scores, &settings);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].state, DupSingle);
        assert_eq!((calls[0].begin_exon, calls[0].end_exon), (1, 1));
    }

    #[test]
    fn test_no_overlapping_calls() {
        use CopyNumberState::*;
        // A strong deletion nested inside broader weak duplication evidence
        let scores = (0..8)
            .map(|exon_index| {
                let del = if (2..=4).contains(&exon_index) { 5.0 } else { -6.0 };
                make_score(exon_index, &[(DelHet, del), (DupMulti, 1.0)])
            })
            .collect::<Vec<_>>();

        let calls = call_chrom_segments(0, 0, &scores, &get_test_settings());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].state, DelHet);
        assert_eq!((calls[0].begin_exon, calls[0].end_exon), (2, 4));
    }
}
