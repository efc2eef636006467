//! P-value calculation from test statistics

use statrs::function::erf::erfc;

/// Two-sided normal p-value `2 * Phi(-|z|)`; NaN for a non-finite statistic
pub fn calculate_pvalue(z: f64) -> f64 {
    if !z.is_finite() {
        return f64::NAN;
    }
    erfc(z.abs() / std::f64::consts::SQRT_2)
}
