//! Extended-precision special functions.
//!
//! The continuation regime needs `ln Γ(a, x)` for shape parameters at or below
//! zero and for arguments where `Γ(a)`, `x^a` or `e^x` leave the `f64` exponent
//! range. Everything here runs on MPFR floats (`rug::Float`) at a working
//! precision fixed once by [`SpecialFunctions::new`]; only final logarithms are
//! rounded back to `f64` by callers.
//!
//! `ln Γ(a, x)` is computed in two ways:
//!
//! - Primary: the regularized `Q(a, x) = Γ(a, x) / Γ(a)`, from the power series
//!   of `P = 1 − Q` when `a > 0` and `x < a + 1`, otherwise from Legendre's
//!   continued fraction (modified Lentz). The result is `ln Q + ln |Γ(a)|`, or
//!   `−∞` when `Q` rounds to zero.
//! - Fallback: MPFR's unregularized `gamma_inc`, used whenever the primary path
//!   reports an error (pole of `Γ(a)`, non-convergence, bad arguments).

use rug::Float;
use rug::float::Special;
use std::f64::consts::{LN_2, LN_10};
use thiserror::Error;

/// Working precision of the reference run, in decimal digits.
pub const DEFAULT_PRECISION_DIGITS: u32 = 70;
/// Iteration cap shared by the series and the continued fraction.
pub const DEFAULT_MAX_ITERATIONS: usize = 20_000;

/// Guard bits dropped from the convergence tolerance.
const TOLERANCE_GUARD_BITS: f64 = 4.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecialFunctionError {
    #[error("Working precision must be at least 1 decimal digit, but was {0}.")]
    InvalidPrecision(u32),

    #[error("Iteration cap must be at least 1, but was {0}.")]
    InvalidIterationCap(usize),

    #[error("Incomplete gamma requires finite a and finite x > 0; got a={a}, x={x}.")]
    InvalidArgument { a: f64, x: f64 },

    #[error("Γ(a) has a pole at a={a}; the regularized form Γ(a,x)/Γ(a) is undefined.")]
    GammaPole { a: f64 },

    #[error("The {method} for Γ({a}, {x}) did not converge within {iterations} iterations.")]
    NoConvergence {
        method: &'static str,
        a: f64,
        x: f64,
        iterations: usize,
    },
}

/// Immutable working-precision settings for all extended-precision evaluation.
///
/// Built once per run and shared by reference; every call allocates its own
/// MPFR values, so the settings can be used from many threads at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecialFunctions {
    digits: u32,
    precision: u32,
    max_iterations: usize,
}

impl SpecialFunctions {
    /// `digits` decimal digits of working precision, converted to
    /// `⌈digits · log₂ 10⌉` bits.
    pub fn new(digits: u32, max_iterations: usize) -> Result<Self, SpecialFunctionError> {
        if digits == 0 {
            return Err(SpecialFunctionError::InvalidPrecision(digits));
        }
        if max_iterations == 0 {
            return Err(SpecialFunctionError::InvalidIterationCap(max_iterations));
        }
        let precision = (f64::from(digits) * LN_10 / LN_2).ceil() as u32;
        Ok(Self {
            digits,
            precision,
            max_iterations,
        })
    }

    #[inline]
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Working precision in bits.
    #[inline]
    pub fn precision_bits(&self) -> u32 {
        self.precision
    }

    #[inline]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Lift an `f64` into a working-precision float.
    #[inline]
    pub fn float(&self, value: f64) -> Float {
        Float::with_val(self.precision, value)
    }

    fn neg_infinity(&self) -> Float {
        Float::with_val(self.precision, Special::NegInfinity)
    }

    /// Relative convergence threshold, 2^−(precision − guard).
    fn tolerance(&self) -> Float {
        let exponent = -(f64::from(self.precision) - TOLERANCE_GUARD_BITS) * LN_2;
        self.float(exponent).exp()
    }

    /// `ln |Γ(x)|` at working precision, rounded to `f64`.
    ///
    /// `+∞` at the poles `x ∈ {0, −1, −2, …}`.
    pub fn ln_gamma(&self, x: f64) -> f64 {
        let (ln_abs, _sign) = self.float(x).ln_abs_gamma();
        ln_abs.to_f64()
    }

    /// `ln |Q(a, x)|` with `Q(a, x) = Γ(a, x) / Γ(a)`.
    ///
    /// `−∞` when `Q` is zero at working precision.
    pub fn log_regularized_upper_gamma(
        &self,
        a: f64,
        x: f64,
    ) -> Result<Float, SpecialFunctionError> {
        self.regularized_parts(a, x).map(|(ln_q, _)| ln_q)
    }

    /// `ln Γ(a, x)` for any finite real `a` and `x > 0`.
    ///
    /// Never fails: a primary-path error switches to the unregularized
    /// fallback, and if that also breaks down the result is NaN or `−∞`, which
    /// callers treat as an undefined cell.
    pub fn log_upper_gamma(&self, a: f64, x: f64) -> Float {
        match self.regularized_parts(a, x) {
            Ok((ln_q, ln_gamma_a)) => {
                if ln_q.is_infinite() && ln_q.is_sign_negative() {
                    return ln_q;
                }
                ln_q + &ln_gamma_a
            }
            Err(err) => {
                log::debug!("regularized Γ({a}, {x}) unavailable: {err}; using direct gamma_inc");
                self.log_upper_gamma_unregularized(a, x)
            }
        }
    }

    /// `ln Γ(a, x)` straight from MPFR's upper incomplete gamma.
    ///
    /// `−∞` when the value is not positive; NaN passes through.
    pub fn log_upper_gamma_unregularized(&self, a: f64, x: f64) -> Float {
        let value = self.float(a).gamma_inc(&self.float(x));
        if value.is_nan() {
            return value;
        }
        if value <= 0 {
            return self.neg_infinity();
        }
        value.ln()
    }

    /// `(ln |Q(a, x)|, ln |Γ(a)|)`.
    fn regularized_parts(&self, a: f64, x: f64) -> Result<(Float, Float), SpecialFunctionError> {
        if !(a.is_finite() && x.is_finite() && x > 0.0) {
            return Err(SpecialFunctionError::InvalidArgument { a, x });
        }
        if a <= 0.0 && a.fract() == 0.0 {
            return Err(SpecialFunctionError::GammaPole { a });
        }

        let prec = self.precision;
        let af = self.float(a);
        let xf = self.float(x);
        let (ln_gamma_a, _sign) = af.clone().ln_abs_gamma();
        if !ln_gamma_a.is_finite() {
            return Err(SpecialFunctionError::GammaPole { a });
        }

        // ln(x^a e^(−x))
        let ln_prefactor = Float::with_val(prec, xf.ln_ref()) * &af - &xf;

        let ln_q = if a > 0.0 && x < a + 1.0 {
            let series = self.lower_series(&af, &xf, a, x)?;
            let ln_p = series.ln() + &ln_prefactor - &ln_gamma_a;
            let q = Float::with_val(prec, 1) - ln_p.exp();
            if q <= 0 { self.neg_infinity() } else { q.ln() }
        } else {
            let fraction = self.upper_continued_fraction(&af, &xf, a, x)?;
            fraction.ln() + &ln_prefactor - &ln_gamma_a
        };
        Ok((ln_q, ln_gamma_a))
    }

    /// `Σₙ xⁿ / (a (a+1) ⋯ (a+n))`, so that `γ(a, x) = x^a e^(−x) · Σ`.
    fn lower_series(
        &self,
        af: &Float,
        xf: &Float,
        a: f64,
        x: f64,
    ) -> Result<Float, SpecialFunctionError> {
        let tol = self.tolerance();
        let mut ap = af.clone();
        let mut term = af.clone().recip();
        let mut sum = term.clone();
        for _ in 0..self.max_iterations {
            ap += 1u32;
            term = term * xf / &ap;
            sum += &term;
            let threshold = sum.clone().abs() * &tol;
            if term.clone().abs() < threshold {
                return Ok(sum);
            }
        }
        Err(SpecialFunctionError::NoConvergence {
            method: "power series",
            a,
            x,
            iterations: self.max_iterations,
        })
    }

    /// Legendre continued fraction `h` with `Γ(a, x) = x^a e^(−x) · h`,
    /// evaluated by the modified Lentz method.
    fn upper_continued_fraction(
        &self,
        af: &Float,
        xf: &Float,
        a: f64,
        x: f64,
    ) -> Result<Float, SpecialFunctionError> {
        let tol = self.tolerance();
        let tiny = self.float(f64::MIN_POSITIVE);

        let mut b = xf.clone() + 1u32 - af;
        let mut c = tiny.clone().recip();
        let mut d = b.clone().recip();
        let mut h = d.clone();
        for i in 1..=self.max_iterations {
            let fi = i as f64;
            // aᵢ = −i (i − a)
            let an = (af.clone() - fi) * fi;
            b += 2u32;
            d = d * &an + &b;
            if d.clone().abs() < tiny {
                d = tiny.clone();
            }
            c = an / &c + &b;
            if c.clone().abs() < tiny {
                c = tiny.clone();
            }
            d.recip_mut();
            let delta = Float::with_val(self.precision, &d * &c);
            h *= &delta;
            if (delta - 1u32).abs() < tol {
                if h <= 0 || !h.is_finite() {
                    break;
                }
                return Ok(h);
            }
        }
        Err(SpecialFunctionError::NoConvergence {
            method: "continued fraction",
            a,
            x,
            iterations: self.max_iterations,
        })
    }
}

impl Default for SpecialFunctions {
    fn default() -> Self {
        let digits = DEFAULT_PRECISION_DIGITS;
        Self {
            digits,
            precision: (f64::from(digits) * LN_10 / LN_2).ceil() as u32,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// E₁(1), the exponential integral at 1.
    const E1_AT_ONE: f64 = 0.219_383_934_395_520_27;

    fn sf() -> SpecialFunctions {
        SpecialFunctions::default()
    }

    #[test]
    fn precision_is_derived_from_decimal_digits() {
        let s = SpecialFunctions::new(70, 100).expect("valid settings");
        assert_eq!(s.digits(), 70);
        assert_eq!(s.precision_bits(), 233);
        assert_eq!(s.max_iterations(), 100);
        assert_eq!(
            SpecialFunctions::default().precision_bits(),
            s.precision_bits()
        );
        assert_eq!(
            SpecialFunctions::new(0, 100).unwrap_err(),
            SpecialFunctionError::InvalidPrecision(0)
        );
        assert_eq!(
            SpecialFunctions::new(30, 0).unwrap_err(),
            SpecialFunctionError::InvalidIterationCap(0)
        );
    }

    #[test]
    fn ln_gamma_matches_factorials_and_half_integer() {
        let s = sf();
        assert_relative_eq!(s.ln_gamma(5.0), 24.0_f64.ln(), epsilon = 1e-14);
        assert_relative_eq!(
            s.ln_gamma(0.5),
            std::f64::consts::PI.sqrt().ln(),
            epsilon = 1e-15
        );
        // Γ(−0.5) = −2√π; the logarithm is of the absolute value.
        assert_relative_eq!(
            s.ln_gamma(-0.5),
            (2.0 * std::f64::consts::PI.sqrt()).ln(),
            epsilon = 1e-14
        );
        assert!(s.ln_gamma(0.0).is_infinite());
    }

    #[test]
    fn shape_one_reduces_to_exponential_tail() {
        let s = sf();
        for &x in &[0.25_f64, 1.0, 3.0, 40.0] {
            assert_relative_eq!(s.log_upper_gamma(1.0, x).to_f64(), -x, epsilon = 1e-13);
        }
    }

    #[test]
    fn series_and_fraction_branches_agree_with_closed_forms() {
        let s = sf();
        // Γ(2, x) = (1 + x) e^(−x): x = 0.5 uses the series, x = 7 the fraction.
        for &x in &[0.5_f64, 7.0] {
            let expected = (1.0 + x).ln() - x;
            assert_relative_eq!(s.log_upper_gamma(2.0, x).to_f64(), expected, epsilon = 1e-13);
        }
        // Γ(½, 2) = √π erfc(√2)
        assert_relative_eq!(
            s.log_upper_gamma(0.5, 2.0).to_f64(),
            -2.517_672_210_197_386_7,
            epsilon = 1e-12
        );
        // Series branch with a non-integer shape.
        assert_relative_eq!(
            s.log_upper_gamma(2.5, 0.3).to_f64(),
            0.272_613_571_413_520_4,
            epsilon = 1e-12
        );
    }

    #[test]
    fn negative_non_integer_shape_uses_the_primary_path() {
        let s = sf();
        let a = -3.555_555_555_555_555_4;
        let x = 5.555_555_555_555_555;
        assert!(s.log_regularized_upper_gamma(a, x).is_ok());
        assert_relative_eq!(
            s.log_upper_gamma(a, x).to_f64(),
            -13.925_333_531_455_143,
            epsilon = 1e-11
        );
    }

    #[test]
    fn poles_of_gamma_fall_back_to_direct_evaluation() {
        let s = sf();
        assert_eq!(
            s.log_regularized_upper_gamma(0.0, 1.0).unwrap_err(),
            SpecialFunctionError::GammaPole { a: 0.0 }
        );
        assert!(matches!(
            s.log_regularized_upper_gamma(-1.0, 1.0),
            Err(SpecialFunctionError::GammaPole { .. })
        ));

        // Γ(0, 1) = E₁(1); Γ(−1, 1) = e^(−1) − E₁(1).
        assert_relative_eq!(
            s.log_upper_gamma(0.0, 1.0).to_f64(),
            E1_AT_ONE.ln(),
            epsilon = 1e-12
        );
        let expected = ((-1.0_f64).exp() - E1_AT_ONE).ln();
        assert_relative_eq!(s.log_upper_gamma(-1.0, 1.0).to_f64(), expected, epsilon = 1e-11);
    }

    #[test]
    fn values_far_below_f64_range_stay_finite_in_log_space() {
        let s = sf();
        // Γ(2, 2000) = 2001 e^(−2000) underflows f64; its logarithm does not.
        let expected = 2001.0_f64.ln() - 2000.0;
        assert_relative_eq!(s.log_upper_gamma(2.0, 2000.0).to_f64(), expected, epsilon = 1e-10);

        let huge = s.log_upper_gamma(1.5, 1e6).to_f64();
        assert_relative_eq!(huge, -999_993.092_244_221, max_relative = 1e-14);
    }

    #[test]
    fn invalid_arguments_are_reported_and_do_not_panic() {
        let s = sf();
        assert!(matches!(
            s.log_regularized_upper_gamma(1.0, 0.0),
            Err(SpecialFunctionError::InvalidArgument { .. })
        ));
        assert!(matches!(
            s.log_regularized_upper_gamma(f64::NAN, 1.0),
            Err(SpecialFunctionError::InvalidArgument { .. })
        ));
        assert!(s.log_upper_gamma(f64::NAN, 1.0).to_f64().is_nan());
    }

    #[test]
    fn iteration_cap_surfaces_as_no_convergence() {
        let tight = SpecialFunctions::new(70, 3).expect("valid settings");
        let err = tight.log_regularized_upper_gamma(-0.5, 0.05).unwrap_err();
        assert!(matches!(err, SpecialFunctionError::NoConvergence { .. }));
        // The fallback still produces the right value.
        let fallback = tight.log_upper_gamma(-0.5, 0.05).to_f64();
        let reference = sf().log_upper_gamma_unregularized(-0.5, 0.05).to_f64();
        assert_relative_eq!(fallback, reference, epsilon = 1e-14);
    }
}
