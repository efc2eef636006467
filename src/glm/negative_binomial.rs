//! Negative binomial density and IRLS helpers (mean/dispersion parameterization)

use statrs::function::gamma::ln_gamma;

/// Floor on fitted means during IRLS
pub const MIN_MU: f64 = 0.5;

/// Coefficients beyond this magnitude (natural-log scale) stop the fit
pub const LARGE_BETA: f64 = 30.0;

/// Clamp on the linear predictor to keep `exp` finite
pub const MAX_ETA: f64 = 700.0;

/// Mean for a sample: `s * exp(eta)`
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// log P(Y = k) for NB with mean `mu` and dispersion `alpha`
pub fn nb_log_likelihood(k: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / alpha;
    ln_gamma(k + size) - ln_gamma(size) - ln_gamma(k + 1.0)
        + size * (size / (size + mu)).ln()
        + k * (mu / (size + mu)).ln()
}

/// IRLS working weight `mu / (1 + alpha * mu)`
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nb_mean() {
        assert!((nb_mean(2.0, 1.5) - 1.5 * 2.0_f64.exp()).abs() < 1e-10);
        assert!(nb_mean(1e6, 1.0).is_finite());
    }

    #[test]
    fn test_nb_log_likelihood_approaches_poisson() {
        // Poisson(5) at k = 5: 5 ln 5 - 5 - ln 120
        let poisson = 5.0 * 5.0_f64.ln() - 5.0 - 120.0_f64.ln();
        let ll = nb_log_likelihood(5.0, 5.0, 1e-8);
        assert!((ll - poisson).abs() < 1e-4);
        assert_eq!(nb_log_likelihood(1.0, 0.0, 0.1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_nb_log_likelihood_geometric_case() {
        // alpha = 1 gives a geometric distribution: P(0) = 1 / (1 + mu)
        let ll = nb_log_likelihood(0.0, 3.0, 1.0);
        assert!((ll - (0.25_f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_nb_weight() {
        assert!((nb_weight(10.0, 0.1) - 5.0).abs() < 1e-10);
    }
}
