//! Λ(ε, α, κ) = E[X/(1+X)] − α over an (α, κ) grid at fixed ε.
//!
//! α never enters the expectation, so the grid is evaluated once along κ and
//! the resulting profile is broadcast across α. The κ sweep is independent per
//! cell and runs on the rayon pool.
//!
//! In the standard regime the shape `k` is fixed by ε, so the engine builds one
//! Gauss–Laguerre rule for the weight `y^(k−1) e^(−y)` and reuses it for every
//! κ. The rule then carries the whole Gamma density and only the smooth factor
//! `1/(1 + θy)` is left to the quadrature.

use crate::config::{ConfigError, SurfaceConfig};
use crate::expectation::{
    GammaParams, Regime, continuation_expectation, scale_from_eps_kappa, standard_expectation,
};
use crate::quadrature::{GaussLaguerreRule, QuadratureError};
use crate::special::{SpecialFunctionError, SpecialFunctions};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Quadrature(#[from] QuadratureError),

    #[error(transparent)]
    SpecialFunction(#[from] SpecialFunctionError),
}

/// Evaluator for one fixed ε.
///
/// Holds the regime chosen for that ε together with the immutable rule and
/// precision settings shared by every κ. Only the standard regime has a rule.
#[derive(Clone, Debug)]
pub struct LambdaEngine {
    eps: f64,
    regime: Regime,
    rule: Option<GaussLaguerreRule>,
    special: SpecialFunctions,
    magnitude_bound: f64,
}

impl LambdaEngine {
    /// Select the regime for `eps` and, in the standard regime, build the
    /// order-`order` rule matched to its shape.
    pub fn new(
        eps: f64,
        order: usize,
        special: SpecialFunctions,
        magnitude_bound: f64,
    ) -> Result<Self, QuadratureError> {
        let regime = Regime::select(eps);
        log::info!(
            "ε={eps}: {} regime, k={:.6}",
            regime.name(),
            regime.shape()
        );
        let rule = match regime {
            Regime::Standard { shape } => {
                Some(GaussLaguerreRule::generalized(order, shape - 1.0)?)
            }
            Regime::Continuation { .. } => None,
        };
        Ok(Self {
            eps,
            regime,
            rule,
            special,
            magnitude_bound,
        })
    }

    pub fn from_config(config: &SurfaceConfig) -> Result<Self, SurfaceError> {
        config.validate()?;
        let special = SpecialFunctions::new(config.precision, config.max_iterations)?;
        Ok(Self::new(
            config.eps,
            config.n_lag,
            special,
            config.magnitude_bound,
        )?)
    }

    #[inline]
    pub fn eps(&self) -> f64 {
        self.eps
    }

    #[inline]
    pub fn regime(&self) -> Regime {
        self.regime
    }

    #[inline]
    pub fn rule(&self) -> Option<&GaussLaguerreRule> {
        self.rule.as_ref()
    }

    #[inline]
    pub fn special(&self) -> &SpecialFunctions {
        &self.special
    }

    #[inline]
    pub fn magnitude_bound(&self) -> f64 {
        self.magnitude_bound
    }

    /// Shape and scale at `kappa`.
    pub fn params(&self, kappa: f64) -> GammaParams {
        GammaParams {
            shape: self.regime.shape(),
            scale: scale_from_eps_kappa(self.eps, kappa),
        }
    }

    /// `E[X/(1+X)]` at one κ; NaN for cells that cannot be evaluated.
    pub fn expectation(&self, kappa: f64) -> f64 {
        match (self.regime, &self.rule) {
            (Regime::Standard { shape }, Some(rule)) => {
                standard_expectation(rule, shape, scale_from_eps_kappa(self.eps, kappa))
            }
            (Regime::Standard { .. }, None) => f64::NAN,
            (Regime::Continuation { .. }, _) => {
                continuation_expectation(&self.special, self.eps, kappa, self.magnitude_bound)
            }
        }
    }

    /// `E[X/(1+X)]` for every κ, in order.
    pub fn profile(&self, kappas: &Array1<f64>) -> Array1<f64> {
        let kappas = kappas.to_vec();
        let profile: Array1<f64> = kappas
            .par_iter()
            .map(|&kappa| self.expectation(kappa))
            .collect::<Vec<f64>>()
            .into();

        let undefined = profile.iter().filter(|v| v.is_nan()).count();
        if !profile.is_empty() && undefined == profile.len() {
            log::warn!("ε={}: every one of {} κ cells is undefined", self.eps, undefined);
        } else {
            log::info!(
                "ε={}: evaluated {} κ cells, {} undefined",
                self.eps,
                profile.len(),
                undefined
            );
        }
        profile
    }

    /// `values[[i, j]] = profile[i] − alphas[j]`, rows indexed by κ.
    pub fn surface(&self, alphas: &Array1<f64>, kappas: &Array1<f64>) -> LambdaSurface {
        let profile = self.profile(kappas);
        let values = broadcast(&profile, alphas);
        LambdaSurface {
            eps: self.eps,
            regime: self.regime,
            alphas: alphas.clone(),
            kappas: kappas.clone(),
            profile,
            values,
        }
    }
}

fn broadcast(profile: &Array1<f64>, alphas: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((profile.len(), alphas.len()), |(i, j)| {
        profile[i] - alphas[j]
    })
}

/// A computed Λ grid and its axes.
#[derive(Clone, Debug)]
pub struct LambdaSurface {
    pub eps: f64,
    pub regime: Regime,
    pub alphas: Array1<f64>,
    pub kappas: Array1<f64>,
    /// `E[X/(1+X)]` per κ.
    pub profile: Array1<f64>,
    /// Shape `(kappas.len(), alphas.len())`.
    pub values: Array2<f64>,
}

impl LambdaSurface {
    pub fn nan_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// `(min, max)` over the defined profile cells, or `None` if there are none.
    pub fn profile_range(&self) -> Option<(f64, f64)> {
        self.profile
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Validate `config`, build its engine and evaluate the full grid.
pub fn build_surface(config: &SurfaceConfig) -> Result<LambdaSurface, SurfaceError> {
    let engine = LambdaEngine::from_config(config)?;
    Ok(engine.surface(&config.alpha_grid(), &config.kappa_grid()))
}
