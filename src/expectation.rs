//! `E[X/(1+X)]` for `X ~ Gamma(k, θ)`.
//!
//! The shape is tied to ε by `k = 2/ε² − 1` and the scale by `θ = ε²κ/2`, so
//! `k` crosses zero at `ε² = 2`. Two evaluators cover the two sides:
//!
//! - [`standard_expectation`] for `k > 0`, where the Gamma law exists and
//!   `E[1/(1+X)]` is a Gauss–Laguerre sum carried in log space.
//! - [`continuation_expectation`] for `k ≤ 0`, which evaluates the closed form
//!   `E[1/(1+X)] = β^k e^β Γ(1 − k, β)` (`β = 1/θ`) past the point where it
//!   stops being a moment. Values there are not probabilities and may leave
//!   `[0, 1]`.
//!
//! Both return NaN for any input they cannot evaluate; nothing here panics or
//! returns an error.

use crate::quadrature::GaussLaguerreRule;
use crate::special::SpecialFunctions;
use rug::Float;

/// Largest `|E[1/(1+X)]|` accepted from the continuation before a cell is
/// declared undefined.
pub const DEFAULT_MAGNITUDE_BOUND: f64 = 1e8;

/// `ε²` at which the shape parameter reaches zero.
pub const REGIME_BOUNDARY_EPS_SQ: f64 = 2.0;

/// Gamma shape/scale pair implied by `(ε, κ)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GammaParams {
    pub shape: f64,
    pub scale: f64,
}

impl GammaParams {
    #[inline]
    pub fn from_eps_kappa(eps: f64, kappa: f64) -> Self {
        Self {
            shape: shape_from_eps(eps),
            scale: scale_from_eps_kappa(eps, kappa),
        }
    }

    /// `β = 1/θ`.
    #[inline]
    pub fn rate(&self) -> f64 {
        self.scale.recip()
    }
}

/// `k = 2/ε² − 1`.
#[inline]
pub fn shape_from_eps(eps: f64) -> f64 {
    2.0 / (eps * eps) - 1.0
}

/// `θ = ε²κ/2`.
#[inline]
pub fn scale_from_eps_kappa(eps: f64, kappa: f64) -> f64 {
    eps * eps * kappa / 2.0
}

/// Which evaluator a fixed ε uses for every κ.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Regime {
    /// `ε² < 2`: Gauss–Laguerre quadrature with `k > 0`.
    Standard { shape: f64 },
    /// `ε² ≥ 2`: closed form continued to `k ≤ 0`.
    Continuation { shape: f64 },
}

impl Regime {
    pub fn select(eps: f64) -> Self {
        let shape = shape_from_eps(eps);
        if eps * eps < REGIME_BOUNDARY_EPS_SQ {
            Regime::Standard { shape }
        } else {
            Regime::Continuation { shape }
        }
    }

    #[inline]
    pub fn shape(&self) -> f64 {
        match *self {
            Regime::Standard { shape } | Regime::Continuation { shape } => shape,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Regime::Standard { .. } => "standard",
            Regime::Continuation { .. } => "continuation",
        }
    }
}

/// `E[X/(1+X)]` for `X ~ Gamma(shape, scale)` by Gauss–Laguerre quadrature.
///
/// With `y = x/θ` and a rule for the weight `y^α e^(−y)`,
///
/// ```text
/// E[1/(1+X)] = ∫ y^α e^(−y) y^p / (1 + θy) dy  /  ∫ y^α e^(−y) y^p dy,   p = k − 1 − α,
/// ```
///
/// and both integrals are summed over the same rule in log space. With the
/// matched rule `α = k − 1` the power `p` vanishes, the normaliser is exactly
/// one, and the only non-polynomial factor left is the smooth `1/(1 + θy)`.
/// Any other rule still works: dividing by the rule's own `Σ wᵢ yᵢ^p` cancels
/// most of its error on `y^p`. For `p < 0` that factor is singular at the
/// origin, so the ratio is first integrated by parts,
///
/// ```text
/// ∫ y^(α+p) e^(−y) g dy ∝ ∫ y^(α+p+1) e^(−y) (g − g′) dy,   g = 1/(1 + θy),
/// ```
///
/// which leaves the integrable `y^(p+1)` in both sums.
///
/// The result lies in `[0, 1)` and is non-decreasing in `θ` for every rule,
/// since the weights are positive and `1/(1 + θy)` is decreasing in `θ`.
///
/// NaN when `shape ≤ 0`, `scale ≤ 0`, an input is not finite, or a log-sum is
/// not finite.
pub fn standard_expectation(rule: &GaussLaguerreRule, shape: f64, scale: f64) -> f64 {
    if !(shape.is_finite() && scale.is_finite()) || shape <= 0.0 || scale <= 0.0 {
        return f64::NAN;
    }

    let power = shape - 1.0 - rule.alpha();
    let (log_numerator, log_normalizer) = if power >= 0.0 {
        (
            rule.log_integrate(|y| power * y.ln() - (scale * y).ln_1p()),
            rule.log_integrate(|y| power * y.ln()),
        )
    } else {
        let lifted = power + 1.0;
        (
            rule.log_integrate(|y| {
                lifted * y.ln() + (scale + scale * y).ln_1p() - 2.0 * (scale * y).ln_1p()
            }),
            rule.log_integrate(|y| lifted * y.ln()),
        )
    };
    if !(log_numerator.is_finite() && log_normalizer.is_finite()) {
        return f64::NAN;
    }

    let inverse_moment = (log_numerator - log_normalizer).exp();
    if !inverse_moment.is_finite() {
        return f64::NAN;
    }
    1.0 - inverse_moment
}

/// `ln E[1/(1+X)] = k ln β + β + ln Γ(1 − k, β)` at working precision.
///
/// Valid for any real `k`; for `k > 0` it is the logarithm of the true inverse
/// moment. NaN unless `k` is finite and `β` is finite and positive.
pub fn log_inverse_moment_closed_form(special: &SpecialFunctions, shape: f64, rate: f64) -> Float {
    if !(shape.is_finite() && rate.is_finite()) || rate <= 0.0 {
        return special.float(f64::NAN);
    }
    let log_tail = special.log_upper_gamma(1.0 - shape, rate);
    special.float(rate).ln() * shape + rate + log_tail
}

/// [`log_inverse_moment_closed_form`] exponentiated and rounded to `f64`.
pub fn inverse_moment_closed_form(special: &SpecialFunctions, shape: f64, rate: f64) -> f64 {
    let log_value = log_inverse_moment_closed_form(special, shape, rate);
    if !log_value.is_finite() {
        return f64::NAN;
    }
    log_value.exp().to_f64()
}

/// `1 − β^k e^β Γ(1 − k, β)` for the `(ε, κ)` pair, with `k ≤ 0` expected.
///
/// NaN when `ε` or `κ` is not a finite positive number, when the extended
/// precision logarithm is not finite, or when `|E[1/(1+X)]|` exceeds
/// `magnitude_bound` or overflows `f64`.
pub fn continuation_expectation(
    special: &SpecialFunctions,
    eps: f64,
    kappa: f64,
    magnitude_bound: f64,
) -> f64 {
    if !(eps.is_finite() && kappa.is_finite()) || eps <= 0.0 || kappa <= 0.0 {
        return f64::NAN;
    }
    let params = GammaParams::from_eps_kappa(eps, kappa);
    let inverse_moment = inverse_moment_closed_form(special, params.shape, params.rate());
    if !inverse_moment.is_finite() || inverse_moment.abs() > magnitude_bound {
        return f64::NAN;
    }
    1.0 - inverse_moment
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    /// Euler–Gompertz constant `e·E₁(1)`.
    const GOMPERTZ: f64 = 0.596_347_362_323_194_1;

    fn rule() -> GaussLaguerreRule {
        GaussLaguerreRule::new(128).expect("default rule")
    }

    fn matched_rule(shape: f64) -> GaussLaguerreRule {
        GaussLaguerreRule::generalized(128, shape - 1.0).expect("matched rule")
    }

    fn sf() -> SpecialFunctions {
        SpecialFunctions::new(70, 20_000).expect("valid settings")
    }

    #[test]
    fn shape_and_scale_follow_eps_and_kappa() {
        let p = GammaParams::from_eps_kappa(0.6, 1.0);
        assert_relative_eq!(p.shape, 2.0 / 0.36 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.scale, 0.18, epsilon = 1e-15);
        assert_relative_eq!(p.rate(), 1.0 / 0.18, epsilon = 1e-12);

        let c = GammaParams::from_eps_kappa(1.5, 1.0);
        assert_relative_eq!(c.shape, -1.0 / 9.0, epsilon = 1e-15);
        assert_relative_eq!(c.scale, 1.125, epsilon = 1e-15);
    }

    #[test]
    fn regime_switches_at_eps_squared_two() {
        assert!(matches!(Regime::select(0.6), Regime::Standard { .. }));
        assert!(matches!(
            Regime::select((2.0_f64 - 1e-9).sqrt()),
            Regime::Standard { .. }
        ));
        assert!(matches!(Regime::select(1.5), Regime::Continuation { .. }));
        assert!(matches!(Regime::select(2.0), Regime::Continuation { .. }));
        assert_relative_eq!(Regime::select(1.5).shape(), -1.0 / 9.0, epsilon = 1e-15);
    }

    #[test]
    fn gompertz_fixture_at_unit_shape_and_scale() {
        let v = standard_expectation(&rule(), 1.0, 1.0);
        assert_relative_eq!(v, 1.0 - GOMPERTZ, epsilon = 1e-10);
    }

    #[test]
    fn tiny_scale_gives_tiny_expectation() {
        let v = standard_expectation(&rule(), 1.0, 1e-6);
        assert!(v >= 0.0 && v < 1e-4, "θ = 1e-6 gave {v}");
        // E[X/(1+X)] ≈ θ − 2θ² for k = 1.
        assert_relative_eq!(v, 1e-6 - 2e-12, max_relative = 1e-8);
    }

    #[test]
    fn standard_values_lie_in_unit_interval() {
        let rule = rule();
        for &k in &[0.01, 0.05, 0.3, 0.9, 1.0, 1.2, 3.0, 50.0] {
            for &theta in &[1e-6, 1e-4, 1e-2, 0.1, 1.0, 5.0, 20.0] {
                let v = standard_expectation(&rule, k, theta);
                assert!(
                    (0.0..=1.0).contains(&v),
                    "k={k}, θ={theta} gave {v} outside [0, 1]"
                );
            }
        }
    }

    #[test]
    fn standard_values_increase_with_scale() {
        let rule = rule();
        let thetas = [1e-6, 1e-4, 1e-2, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0];
        for &k in &[0.05, 0.5, 1.0, 2.0, 4.5] {
            let values: Vec<f64> = thetas
                .iter()
                .map(|&t| standard_expectation(&rule, k, t))
                .collect();
            for pair in values.windows(2) {
                assert!(
                    pair[1] >= pair[0] - 1e-12,
                    "k={k}: sequence not monotone: {values:?}"
                );
            }
        }
    }

    #[test]
    fn quadrature_agrees_with_closed_form_at_default_eps() {
        let sf = sf();
        let p = GammaParams::from_eps_kappa(0.6, 1.0);
        let quad = standard_expectation(&matched_rule(p.shape), p.shape, p.scale);
        let closed = 1.0 - inverse_moment_closed_form(&sf, p.shape, p.rate());
        assert_abs_diff_eq!(quad, closed, epsilon = 1e-12);
        assert_abs_diff_eq!(standard_expectation(&rule(), p.shape, p.scale), closed, epsilon = 1e-6);
        assert_relative_eq!(closed, 0.427_600_709_115_947_94, epsilon = 1e-12);
    }

    #[test]
    fn matched_rule_tracks_closed_form_for_fractional_shapes() {
        let sf = sf();
        for &eps in &[1.2_f64, 1.3, 1.35, 1.4, (2.0_f64 - 1e-4).sqrt()] {
            let shape = shape_from_eps(eps);
            assert!(shape > 0.0 && shape < 1.0);
            let rule = matched_rule(shape);
            for &kappa in &[1e-6, 1e-3, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0] {
                let p = GammaParams::from_eps_kappa(eps, kappa);
                let quad = standard_expectation(&rule, p.shape, p.scale);
                let closed = 1.0 - inverse_moment_closed_form(&sf, p.shape, p.rate());
                assert_abs_diff_eq!(quad, closed, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn mismatched_rule_still_bounded_and_monotone() {
        // A plain rule forces the by-parts path for k < 1.
        let plain = rule();
        let thetas = [1e-6, 1e-3, 0.1, 1.0, 10.0];
        for &k in &[0.05, 0.4, 0.9] {
            let values: Vec<f64> = thetas
                .iter()
                .map(|&t| standard_expectation(&plain, k, t))
                .collect();
            assert!(values.iter().all(|v| (0.0..1.0).contains(v)), "{values:?}");
            for pair in values.windows(2) {
                assert!(pair[1] >= pair[0] - 1e-12, "k={k}: {values:?}");
            }
        }
    }

    #[test]
    fn matched_rule_has_unit_normalizer() {
        for &k in &[0.2_f64, 1.0, 4.5, 199.0] {
            let rule = matched_rule(k);
            assert_abs_diff_eq!(rule.log_integrate(|_| 0.0), 0.0, epsilon = 1e-13);
            assert_relative_eq!(
                standard_expectation(&rule, k, 1.0),
                1.0 - inverse_moment_closed_form(&sf(), k, 1.0),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn continuation_reproduces_reference_value() {
        // k ≈ −0.111; E[1/(1+X)] is continued past 1, so the value is negative.
        let v = continuation_expectation(&sf(), 1.5, 1.0, DEFAULT_MAGNITUDE_BOUND);
        assert!(v.is_finite() && v < 1.0);
        assert_relative_eq!(v, -0.075_655_064_654_177_15, max_relative = 1e-10);
    }

    #[test]
    fn continuation_vanishes_at_the_boundary() {
        // ε² = 2 gives k = 0 and E[1/(1+X)] = β e^β Γ(1, β) = 1.
        for &kappa in &[1e-3, 1.0, 10.0] {
            let v = continuation_expectation(&sf(), 2.0_f64.sqrt(), kappa, DEFAULT_MAGNITUDE_BOUND);
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn continuation_rejects_invalid_inputs_and_large_magnitudes() {
        let sf = sf();
        assert!(continuation_expectation(&sf, 0.0, 1.0, DEFAULT_MAGNITUDE_BOUND).is_nan());
        assert!(continuation_expectation(&sf, -1.5, 1.0, DEFAULT_MAGNITUDE_BOUND).is_nan());
        assert!(continuation_expectation(&sf, 1.5, 0.0, DEFAULT_MAGNITUDE_BOUND).is_nan());
        assert!(continuation_expectation(&sf, 1.5, f64::NAN, DEFAULT_MAGNITUDE_BOUND).is_nan());
        assert!(continuation_expectation(&sf, f64::INFINITY, 1.0, DEFAULT_MAGNITUDE_BOUND).is_nan());
        // |E[1/(1+X)]| ≈ 1.076 here, so a bound of 1 rejects it.
        assert!(continuation_expectation(&sf, 1.5, 1.0, 1.0).is_nan());
    }

    #[test]
    fn standard_rejects_invalid_inputs() {
        let rule = rule();
        assert!(standard_expectation(&rule, 0.0, 1.0).is_nan());
        assert!(standard_expectation(&rule, -0.5, 1.0).is_nan());
        assert!(standard_expectation(&rule, 2.0, 0.0).is_nan());
        assert!(standard_expectation(&rule, 2.0, -1.0).is_nan());
        assert!(standard_expectation(&rule, f64::NAN, 1.0).is_nan());
        assert!(standard_expectation(&rule, 2.0, f64::INFINITY).is_nan());
    }

    #[test]
    fn rule_normalizer_tracks_high_precision_gamma_for_integer_shapes() {
        let rule = rule();
        let sf = sf();
        for &k in &[1.0_f64, 2.0, 5.0, 30.0] {
            let from_rule = rule.log_integrate(|y| (k - 1.0) * y.ln());
            assert_relative_eq!(from_rule, sf.ln_gamma(k), epsilon = 1e-9, max_relative = 1e-10);
        }
    }

    #[test]
    fn closed_form_rejects_invalid_rate() {
        let sf = sf();
        assert!(inverse_moment_closed_form(&sf, 1.0, 0.0).is_nan());
        assert!(inverse_moment_closed_form(&sf, 1.0, f64::NAN).is_nan());
        assert!(inverse_moment_closed_form(&sf, f64::INFINITY, 1.0).is_nan());
    }
}
