#![deny(dead_code)]
#![deny(unused_imports)]

pub mod config;
pub mod expectation;
pub mod logspace;
pub mod quadrature;
pub mod special;
pub mod surface;

pub use config::{ConfigError, SurfaceConfig};
pub use expectation::{
    GammaParams, Regime, continuation_expectation, inverse_moment_closed_form,
    log_inverse_moment_closed_form, standard_expectation,
};
pub use logspace::{LogSumExp, log_sum_exp};
pub use quadrature::{GaussLaguerreRule, QuadratureError};
pub use special::{SpecialFunctionError, SpecialFunctions};
pub use surface::{LambdaEngine, LambdaSurface, SurfaceError, build_surface};
