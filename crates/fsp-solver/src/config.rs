//! Solver configuration.

use fsp_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::ode_adaptive::OdeOptions;

/// Integrator used for the augmented probability/sensitivity systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OdeMethod {
    /// Adaptive Dormand–Prince 5(4).
    Rk45,
    /// Fixed-step classic RK4.
    Rk4 {
        /// Step size.
        dt: f64,
    },
}

/// Runtime configuration for [`FspSolver`](crate::FspSolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Truncation parameter: `(0, …, 0, cr)` is the last enumerated state.
    pub cr: u64,
    /// Integrator.
    pub method: OdeMethod,
    /// Tolerances and step budget (`max_steps` also bounds [`OdeMethod::Rk4`]).
    pub ode: OdeOptions,
    /// Integrate the per-reaction systems on the rayon pool.
    pub parallel: bool,
    /// Log a warning when more than this much probability has left the
    /// truncated domain by the last output time.
    pub mass_loss_warning: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            cr: 4,
            method: OdeMethod::Rk45,
            ode: OdeOptions::default(),
            parallel: true,
            mass_loss_warning: 1e-3,
        }
    }
}

impl SolverConfig {
    /// Default configuration with truncation `cr`.
    pub fn with_cr(cr: u64) -> Self {
        Self { cr, ..Self::default() }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        self.ode.validate()?;
        if let OdeMethod::Rk4 { dt } = self.method {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(Error::Validation(format!("config: rk4 dt must be finite and > 0, got {dt}")));
            }
        }
        if !self.mass_loss_warning.is_finite() || self.mass_loss_warning < 0.0 {
            return Err(Error::Validation(format!(
                "config: mass_loss_warning must be finite and >= 0, got {}",
                self.mass_loss_warning
            )));
        }
        Ok(())
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let c = SolverConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.cr, 4);
        assert_eq!(c.method, OdeMethod::Rk45);
    }

    #[test]
    fn from_json_fills_defaults() {
        let c = SolverConfig::from_json(r#"{"cr": 30, "ode": {"rtol": 1e-8}}"#).unwrap();
        assert_eq!(c.cr, 30);
        assert_eq!(c.ode.rtol, 1e-8);
        assert_eq!(c.ode.atol, OdeOptions::default().atol);
        assert!(c.parallel);

        let c = SolverConfig::from_json(r#"{"method": {"kind": "rk4", "dt": 0.01}}"#).unwrap();
        assert_eq!(c.method, OdeMethod::Rk4 { dt: 0.01 });
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(SolverConfig::from_json(r#"{"method": {"kind": "rk4", "dt": 0}}"#).is_err());
        assert!(SolverConfig::from_json(r#"{"mass_loss_warning": -1}"#).is_err());
        assert!(SolverConfig::from_json(r#"{"ode": {"max_steps": 0}}"#).is_err());
        assert!(matches!(SolverConfig::from_json("{"), Err(Error::Json(_))));
    }
}
