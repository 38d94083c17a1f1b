use statrs::function::gamma::ln_gamma;

/// Natural log of the beta function
///
fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Natural log of the binomial coefficient "n choose k"
///
pub fn ln_binomial_coefficient(n: u64, k: u64) -> f64 {
    assert!(k <= n);
    ln_gamma(n as f64 + 1.0) - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0)
}

/// Log probability mass of observing `k` successes in `n` beta-binomial trials
///
/// The beta-binomial is parameterized here by its standard shape values. For a mean success
/// proportion `p` and concentration `c`, use `alpha = p * c` and `beta = (1 - p) * c`.
///
/// All inputs are required to be valid (`k <= n`, positive shapes), so the return value is
/// always finite.
///
pub fn beta_binomial_lnpmf(k: u64, n: u64, alpha: f64, beta: f64) -> f64 {
    assert!(k <= n);
    assert!(alpha > 0.0 && beta > 0.0);

    ln_binomial_coefficient(n, k) + ln_beta(k as f64 + alpha, (n - k) as f64 + beta)
        - ln_beta(alpha, beta)
}

/// Convert a natural-log Bayes factor into a decimal mantissa/exponent pair
///
/// Aggregate Bayes factors over long segments can be far too large to exponentiate in f64, so
/// output formatting works from this decomposition instead.
///
pub fn ln_bayes_factor_to_sci(ln_bf: f64) -> (f64, i64) {
    let log10_bf = ln_bf / std::f64::consts::LN_10;
    let exponent = log10_bf.floor() as i64;
    let mantissa = 10f64.powf(log10_bf - exponent as f64);
    (mantissa, exponent)
}
