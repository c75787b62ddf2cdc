use crate::expectation::DEFAULT_MAGNITUDE_BOUND;
use crate::quadrature::DEFAULT_ORDER;
use crate::special::{DEFAULT_MAX_ITERATIONS, DEFAULT_PRECISION_DIGITS};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ε must be a finite positive number, but was {0}.")]
    InvalidEps(f64),

    #[error("The {axis} range [{min}, {max}] must have finite bounds with min <= max.")]
    InvalidRange {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    #[error("The {axis} grid needs at least one sample.")]
    EmptyGrid { axis: &'static str },

    #[error("Quadrature order must be at least 1.")]
    ZeroQuadratureOrder,

    #[error("Working precision must be at least 1 decimal digit.")]
    ZeroPrecision,

    #[error("Magnitude bound must be a finite positive number, but was {0}.")]
    InvalidMagnitudeBound(f64),

    #[error("Iteration cap must be at least 1.")]
    ZeroIterationCap,

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config json: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn default_eps() -> f64 {
    0.6
}

pub fn default_alpha_range() -> (f64, f64) {
    (0.0, 1.2)
}

pub fn default_kappa_range() -> (f64, f64) {
    (1e-6, 10.0)
}

pub fn default_n_alpha() -> usize {
    400
}

pub fn default_n_kappa() -> usize {
    300
}

pub fn default_n_lag() -> usize {
    DEFAULT_ORDER
}

pub fn default_precision() -> u32 {
    DEFAULT_PRECISION_DIGITS
}

pub fn default_magnitude_bound() -> f64 {
    DEFAULT_MAGNITUDE_BOUND
}

pub fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

/// Everything needed to build one Λ surface.
///
/// Every field may be omitted from JSON and takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_alpha_range")]
    pub alpha_range: (f64, f64),
    #[serde(default = "default_kappa_range")]
    pub kappa_range: (f64, f64),
    #[serde(default = "default_n_alpha")]
    pub n_alpha: usize,
    #[serde(default = "default_n_kappa")]
    pub n_kappa: usize,
    /// Gauss–Laguerre order.
    #[serde(default = "default_n_lag")]
    pub n_lag: usize,
    /// Working decimal digits for the continuation.
    #[serde(default = "default_precision")]
    pub precision: u32,
    #[serde(default = "default_magnitude_bound")]
    pub magnitude_bound: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            alpha_range: default_alpha_range(),
            kappa_range: default_kappa_range(),
            n_alpha: default_n_alpha(),
            n_kappa: default_n_kappa(),
            n_lag: default_n_lag(),
            precision: default_precision(),
            magnitude_bound: default_magnitude_bound(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl SurfaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(ConfigError::InvalidEps(self.eps));
        }
        check_range("alpha", self.alpha_range)?;
        check_range("kappa", self.kappa_range)?;
        if self.n_alpha == 0 {
            return Err(ConfigError::EmptyGrid { axis: "alpha" });
        }
        if self.n_kappa == 0 {
            return Err(ConfigError::EmptyGrid { axis: "kappa" });
        }
        if self.n_lag == 0 {
            return Err(ConfigError::ZeroQuadratureOrder);
        }
        if self.precision == 0 {
            return Err(ConfigError::ZeroPrecision);
        }
        if !self.magnitude_bound.is_finite() || self.magnitude_bound <= 0.0 {
            return Err(ConfigError::InvalidMagnitudeBound(self.magnitude_bound));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterationCap);
        }
        Ok(())
    }

    /// Parse and validate.
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let payload = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&payload)
    }

    pub fn alpha_grid(&self) -> Array1<f64> {
        linspace(self.alpha_range, self.n_alpha)
    }

    pub fn kappa_grid(&self) -> Array1<f64> {
        linspace(self.kappa_range, self.n_kappa)
    }
}

fn check_range(axis: &'static str, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(ConfigError::InvalidRange { axis, min, max });
    }
    Ok(())
}

/// Evenly spaced samples including both ends; a single sample is `[min]`.
pub fn linspace((min, max): (f64, f64), n: usize) -> Array1<f64> {
    Array1::linspace(min, max, n)
}
