use serde::{Deserialize, Serialize};
use strum::EnumCount;

use crate::cli::CallSettings;
use crate::exon_model::ExonModel;
use crate::prob_utils::beta_binomial_lnpmf;

/// Upper clamp on state proportions, keeps the beta shape parameters positive for exons
/// capturing nearly all of a sample's reads
const MAX_STATE_PROPORTION: f64 = 1.0 - 1e-9;

#[derive(
    Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize, strum::EnumCount, strum::FromRepr,
)]
#[repr(usize)]
pub enum CopyNumberState {
    /// Homozygous deletion (0 copies)
    DelHom,
    /// Heterozygous deletion (1 copy)
    DelHet,
    /// The reference state for all likelihood ratios (2 copies)
    Normal,
    /// Single-copy duplication (3 copies)
    DupSingle,
    /// Multi-copy duplication (4 or more copies)
    DupMulti,
}

impl CopyNumberState {
    /// Discrete read-count multiplier relative to the normal state
    ///
    /// The homozygous deletion multiplier is a small configured floor rather than zero, giving
    /// the model a way to explain occasional stray reads inside a zero-copy region.
    ///
    pub fn multiplier(self, zero_state_multiplier: f64) -> f64 {
        use CopyNumberState::*;
        match self {
            DelHom => zero_state_multiplier,
            DelHet => 0.5,
            Normal => 1.0,
            DupSingle => 1.5,
            DupMulti => 2.0,
        }
    }

    pub fn label(self) -> &'static str {
        use CopyNumberState::*;
        match self {
            DelHom => "DEL_HOM",
            DelHet => "DEL_HET",
            Normal => "NORMAL",
            DupSingle => "DUP_SINGLE",
            DupMulti => "DUP_MULTI",
        }
    }

    pub fn all_states() -> impl Iterator<Item = CopyNumberState> {
        (0..CopyNumberState::COUNT).map(|x| CopyNumberState::from_repr(x).unwrap())
    }

    pub fn non_normal_states() -> impl Iterator<Item = CopyNumberState> {
        Self::all_states().filter(|&x| x != CopyNumberState::Normal)
    }
}

/// Per-exon scoring result for one test sample
///
/// Only informative exons are scored, so a sample's score list is a subset of the matrix exon
/// list, with `exon_index` linking back to genomic position.
///
pub struct ExonScore {
    pub exon_index: usize,

    /// Beta-binomial log-likelihood of the observed count under each copy-number state
    pub state_lnliks: [f64; CopyNumberState::COUNT],

    /// Observed read depth over the expected depth under the normal state
    pub depth_ratio: f64,
}

impl ExonScore {
    /// Log Bayes factor of the given state versus the normal state
    pub fn ln_bayes_factor(&self, state: CopyNumberState) -> f64 {
        self.state_lnliks[state as usize] - self.state_lnliks[CopyNumberState::Normal as usize]
    }
}

/// Scale the normal-state proportion to a candidate state
///
/// Odds scaling keeps the full set of state proportions consistent at every exon: the state
/// proportion is m*p reads against the unchanged (1-p) background of all other exons.
///
fn get_state_proportion(expected_proportion: f64, multiplier: f64) -> f64 {
    let scaled = multiplier * expected_proportion;
    (scaled / (scaled + (1.0 - expected_proportion))).min(MAX_STATE_PROPORTION)
}

/// Score one exon of the test sample under every copy-number state
///
/// Returns None when both the observed and expected read depth fall below the configured
/// minimum: such exons are too sparse to carry reliable likelihoods and are excluded from
/// segmentation rather than scored.
///
pub fn score_exon(
    exon_index: usize,
    observed_count: u64,
    sample_total: u64,
    model: &ExonModel,
    settings: &CallSettings,
) -> Option<ExonScore> {
    assert!(observed_count <= sample_total);
    assert!(model.expected_proportion > 0.0);

    let expected_proportion = model.expected_proportion.min(MAX_STATE_PROPORTION);
    let expected_count = expected_proportion * sample_total as f64;
    let min_depth = settings.min_read_depth as f64;
    if (observed_count as f64) < min_depth && expected_count < min_depth {
        return None;
    }

    let mut state_lnliks = [0.0; CopyNumberState::COUNT];
    for state in CopyNumberState::all_states() {
        let state_proportion = get_state_proportion(
            expected_proportion,
            state.multiplier(settings.zero_state_multiplier),
        );
        let alpha = state_proportion * model.concentration;
        let beta = (1.0 - state_proportion) * model.concentration;
        state_lnliks[state as usize] =
            beta_binomial_lnpmf(observed_count, sample_total, alpha, beta);
    }

    Some(ExonScore {
        exon_index,
        state_lnliks,
        depth_ratio: observed_count as f64 / expected_count,
    })
}
