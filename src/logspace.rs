//! Log-space accumulation helpers.
//!
//! Quadrature terms for large shape parameters span hundreds of orders of
//! magnitude (y^(k−1) against weights near 1e-200), so every sum in the
//! standard regime is carried as logarithms and collapsed here.

/// Stable `ln Σ exp(terms)`.
///
/// Returns `−∞` when the input is empty, when every term is `−∞` (all summands
/// are zero), or when the maximum is not finite. The exponential sum is never
/// evaluated in those cases, so a NaN term cannot leak through `exp`.
#[inline]
pub fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, |acc, t| {
        // NaN must poison the max instead of being skipped by f64::max.
        if t.is_nan() || acc.is_nan() {
            f64::NAN
        } else {
            acc.max(t)
        }
    });
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = terms.iter().map(|&t| (t - max).exp()).sum();
    max + sum.ln()
}

/// Streaming variant of [`log_sum_exp`] for terms produced on the fly.
///
/// Keeps a running maximum and rescales the partial sum whenever the maximum
/// moves, so no intermediate buffer is needed.
#[derive(Clone, Copy, Debug)]
pub struct LogSumExp {
    max: f64,
    scaled_sum: f64,
    poisoned: bool,
}

impl LogSumExp {
    pub fn new() -> Self {
        Self {
            max: f64::NEG_INFINITY,
            scaled_sum: 0.0,
            poisoned: false,
        }
    }

    #[inline]
    pub fn push(&mut self, term: f64) {
        if term.is_nan() || term == f64::INFINITY {
            self.poisoned = true;
            return;
        }
        if term == f64::NEG_INFINITY {
            return;
        }
        if term <= self.max {
            self.scaled_sum += (term - self.max).exp();
        } else {
            self.scaled_sum = self.scaled_sum * (self.max - term).exp() + 1.0;
            self.max = term;
        }
    }

    /// Logarithm of the accumulated sum, with the same edge-case contract as
    /// [`log_sum_exp`].
    #[inline]
    pub fn finish(&self) -> f64 {
        if self.poisoned || !self.max.is_finite() {
            return f64::NEG_INFINITY;
        }
        self.max + self.scaled_sum.ln()
    }
}

impl Default for LogSumExp {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<f64> for LogSumExp {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for t in iter {
            self.push(t);
        }
    }
}
