//! Gauss-Laguerre Quadrature for Gamma-Weighted Integrals
//!
//! Approximates expectations under the unit-scale Gamma law with shape `α + 1`,
//!
//! ```text
//! ∫₀^∞ y^α e^(−y) f(y) dy / Γ(α+1) ≈ Σᵢ wᵢ f(yᵢ),   Σᵢ wᵢ = 1,
//! ```
//!
//! which is exact when `f` is a polynomial of degree ≤ 2N−1. With `α = 0` this
//! is the classic rule for `∫ e^(−y) f(y) dy`. Putting the power `y^α` in the
//! weight rather than in `f` keeps the rule exact for shapes below one, where
//! `y^α` is singular at the origin.
//!
//! # Construction
//!
//! The nodes are the eigenvalues of the symmetric tridiagonal Jacobi matrix of
//! the generalized Laguerre recurrence
//!
//! ```text
//! (n+1) L_{n+1}(x) = (2n+1+α−x) L_n(x) − (n+α) L_{n−1}(x)
//! ```
//!
//! whose diagonal is `2i+1+α` and off-diagonal `√((i+1)(i+1+α))`. They are
//! located by Sturm bisection and then polished by Newton iteration on `L_N`,
//! which restores full relative accuracy on the smallest nodes.
//!
//! Weights are not read off eigenvectors (as in classic Golub-Welsch): at N=128
//! the outermost weights are below 1e-200 and only their logarithm is usable.
//! Instead they come from the closed form
//!
//! ```text
//! wᵢ ∝ 1 / (yᵢ [L_N'(yᵢ)]²) = yᵢ / ((N+α)² L_{N−1}(yᵢ)²)
//! ```
//!
//! evaluated in log-space with a rescaled recurrence, so `ln wᵢ` stays finite
//! even when `wᵢ` itself underflows. The common factor is fixed by `Σ wᵢ = 1`.

use crate::logspace::{LogSumExp, log_sum_exp};
use thiserror::Error;

/// Default rule order used by the surface engine.
pub const DEFAULT_ORDER: usize = 128;

/// Rescale the Laguerre recurrence whenever a value exceeds this magnitude.
const RECURRENCE_RESCALE: f64 = 1e150;
const NEWTON_MAX_ITER: usize = 60;
const BISECTION_MAX_ITER: usize = 200;
/// Pivot floor for the LDLᵀ Sturm count.
const STURM_PIVOT_GUARD: f64 = 1e-300;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuadratureError {
    #[error("Quadrature order must be at least 1, but was {0}.")]
    InvalidOrder(usize),

    #[error("Laguerre exponent must be finite and greater than -1, but was {0}.")]
    InvalidAlpha(f64),

    #[error("Gauss-Laguerre node {index} is not a finite positive value: {value}.")]
    InvalidNode { index: usize, value: f64 },

    #[error(
        "Gauss-Laguerre nodes are not strictly increasing at index {index} ({previous} >= {current})."
    )]
    NonMonotoneNodes {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("Gauss-Laguerre weight {index} has a non-finite logarithm: {log_weight}.")]
    InvalidWeight { index: usize, log_weight: f64 },
}

/// Gauss-Laguerre rule: nodes and log-weights, immutable once built.
#[derive(Clone, Debug)]
pub struct GaussLaguerreRule {
    /// Exponent of the weight `y^α e^(−y)`.
    alpha: f64,
    /// Quadrature nodes (roots of L_N), strictly increasing and positive.
    nodes: Vec<f64>,
    /// Natural logarithm of each weight.
    log_weights: Vec<f64>,
}

impl GaussLaguerreRule {
    /// Build the order-`order` rule for the weight `e^(−y)`.
    pub fn new(order: usize) -> Result<Self, QuadratureError> {
        Self::generalized(order, 0.0)
    }

    /// Build the order-`order` rule for the weight `y^α e^(−y)`, `α > −1`.
    pub fn generalized(order: usize, alpha: f64) -> Result<Self, QuadratureError> {
        if order == 0 {
            return Err(QuadratureError::InvalidOrder(order));
        }
        if !alpha.is_finite() || alpha <= -1.0 {
            return Err(QuadratureError::InvalidAlpha(alpha));
        }
        let (diag, off_diag) = laguerre_jacobi(order, alpha);
        let seeds = tridiagonal_eigenvalues(&diag, &off_diag);

        let mut nodes = Vec::with_capacity(order);
        let mut log_weights = Vec::with_capacity(order);
        for (index, seed) in seeds.into_iter().enumerate() {
            let node = polish_root(order, alpha, seed);
            if !(node.is_finite() && node > 0.0) {
                return Err(QuadratureError::InvalidNode { index, value: node });
            }
            if let Some(&previous) = nodes.last()
                && previous >= node
            {
                return Err(QuadratureError::NonMonotoneNodes {
                    index,
                    previous,
                    current: node,
                });
            }
            let log_weight = log_weight_at(order, alpha, node);
            if !log_weight.is_finite() {
                return Err(QuadratureError::InvalidWeight { index, log_weight });
            }
            nodes.push(node);
            log_weights.push(log_weight);
        }

        let log_total = log_sum_exp(&log_weights);
        if !log_total.is_finite() {
            return Err(QuadratureError::InvalidWeight {
                index: 0,
                log_weight: log_total,
            });
        }
        for lw in &mut log_weights {
            *lw -= log_total;
        }

        log::debug!(
            "built Gauss-Laguerre rule: order={order}, alpha={alpha}, nodes in [{:.3e}, {:.3e}]",
            nodes[0],
            nodes[order - 1]
        );
        Ok(Self {
            alpha,
            nodes,
            log_weights,
        })
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    #[inline]
    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }

    /// Weights in linear space; the outermost ones underflow to zero for large
    /// orders.
    pub fn weights(&self) -> Vec<f64> {
        self.log_weights.iter().map(|lw| lw.exp()).collect()
    }

    /// `Σ wᵢ f(yᵢ)` in ordinary floating point.
    pub fn integrate<F>(&self, mut f: F) -> f64
    where
        F: FnMut(f64) -> f64,
    {
        self.nodes
            .iter()
            .zip(&self.log_weights)
            .map(|(&y, &lw)| lw.exp() * f(y))
            .sum()
    }

    /// `ln Σ wᵢ exp(log_f(yᵢ))` for a non-negative integrand known through its
    /// logarithm.
    pub fn log_integrate<F>(&self, mut log_f: F) -> f64
    where
        F: FnMut(f64) -> f64,
    {
        let mut acc = LogSumExp::new();
        for (&y, &lw) in self.nodes.iter().zip(&self.log_weights) {
            acc.push(lw + log_f(y));
        }
        acc.finish()
    }
}

/// Jacobi matrix of the generalized Laguerre recurrence.
fn laguerre_jacobi(order: usize, alpha: f64) -> (Vec<f64>, Vec<f64>) {
    let diag = (0..order).map(|i| (2 * i + 1) as f64 + alpha).collect();
    let off_diag = (0..order.saturating_sub(1))
        .map(|i| {
            let j = (i + 1) as f64;
            (j * (j + alpha)).sqrt()
        })
        .collect();
    (diag, off_diag)
}

/// Number of eigenvalues strictly below `lambda` (LDLᵀ Sturm sequence).
fn sturm_count(diag: &[f64], off_diag: &[f64], lambda: f64) -> usize {
    let mut count = 0;
    let mut q = diag[0] - lambda;
    if q < 0.0 {
        count += 1;
    }
    for i in 1..diag.len() {
        let q_safe = if q.abs() < STURM_PIVOT_GUARD {
            if q >= 0.0 {
                STURM_PIVOT_GUARD
            } else {
                -STURM_PIVOT_GUARD
            }
        } else {
            q
        };
        q = (diag[i] - lambda) - off_diag[i - 1] * off_diag[i - 1] / q_safe;
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

/// All eigenvalues of a symmetric tridiagonal matrix by Sturm bisection,
/// ascending.
fn tridiagonal_eigenvalues(diag: &[f64], off_diag: &[f64]) -> Vec<f64> {
    let n = diag.len();
    if n == 1 {
        return vec![diag[0]];
    }

    // Gershgorin bounds
    let mut lo = f64::MAX;
    let mut hi = f64::MIN;
    for i in 0..n {
        let e_left = if i > 0 { off_diag[i - 1].abs() } else { 0.0 };
        let e_right = if i < n - 1 { off_diag[i].abs() } else { 0.0 };
        lo = lo.min(diag[i] - e_left - e_right);
        hi = hi.max(diag[i] + e_left + e_right);
    }
    // Laguerre roots are positive; the Gershgorin lower bound is not.
    lo = lo.max(0.0);
    hi += 1.0;

    let mut eigenvalues = Vec::with_capacity(n);
    for k in 0..n {
        let mut a = eigenvalues.last().copied().unwrap_or(lo);
        let mut b = hi;
        for _ in 0..BISECTION_MAX_ITER {
            let mid = 0.5 * (a + b);
            if (b - a) < 2.0 * f64::EPSILON * mid.abs().max(f64::MIN_POSITIVE) {
                break;
            }
            if sturm_count(diag, off_diag, mid) <= k {
                a = mid;
            } else {
                b = mid;
            }
        }
        eigenvalues.push(0.5 * (a + b));
    }
    eigenvalues
}

/// `(L_n^α(x), L_{n−1}^α(x), ln s)` where the true values are the returned
/// pair times `s`. The shared scale keeps large-order, large-x evaluations
/// finite.
fn laguerre_scaled(n: usize, alpha: f64, x: f64) -> (f64, f64, f64) {
    let mut prev = 1.0_f64;
    let mut curr = 1.0 + alpha - x;
    let mut log_scale = 0.0_f64;
    if n == 1 {
        return (curr, prev, log_scale);
    }
    for j in 1..n {
        let jf = j as f64;
        let next = ((2.0 * jf + 1.0 + alpha - x) * curr - (jf + alpha) * prev) / (jf + 1.0);
        prev = curr;
        curr = next;
        if curr.abs() > RECURRENCE_RESCALE {
            prev /= RECURRENCE_RESCALE;
            curr /= RECURRENCE_RESCALE;
            log_scale += RECURRENCE_RESCALE.ln();
        }
    }
    (curr, prev, log_scale)
}

/// Newton refinement of a root of `L_n^α` starting from a bisection seed.
fn polish_root(n: usize, alpha: f64, seed: f64) -> f64 {
    let nf = n as f64;
    let mut x = seed;
    for _ in 0..NEWTON_MAX_ITER {
        let (ln, ln1, _) = laguerre_scaled(n, alpha, x);
        // x L_n'(x) = n L_n(x) − (n+α) L_{n−1}(x); the common scale cancels.
        let deriv = (nf * ln - (nf + alpha) * ln1) / x;
        if deriv == 0.0 || !deriv.is_finite() {
            break;
        }
        let step = ln / deriv;
        let next = x - step;
        if !(next.is_finite() && next > 0.0) {
            break;
        }
        x = next;
        if step.abs() <= 4.0 * f64::EPSILON * x {
            break;
        }
    }
    x
}

/// Unnormalized `ln wᵢ = ln yᵢ − 2 ln (N+α) − 2 ln |L_{N−1}(yᵢ)|`.
fn log_weight_at(n: usize, alpha: f64, node: f64) -> f64 {
    let (_, ln1, log_scale) = laguerre_scaled(n, alpha, node);
    node.ln() - 2.0 * (n as f64 + alpha).ln() - 2.0 * (ln1.abs().ln() + log_scale)
}
