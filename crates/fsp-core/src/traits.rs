//! Propensity contract for reaction channels.
//!
//! Every reaction carries one propensity. The generator builder evaluates it
//! with a unit parameter vector and applies the kinetic parameters afterwards
//! by linear combination, so a propensity is expected to be linear in the
//! parameter it belongs to.

use serde::{Deserialize, Serialize};

/// Instantaneous rate of a reaction channel.
///
/// Implemented for every `Fn(&[f64], &[u64]) -> f64 + Send + Sync`, so plain
/// closures can be stored in a [`Crn`](crate::Crn) directly.
pub trait Propensity: Send + Sync {
    /// Rate of the reaction in `state` under the kinetic `params`.
    ///
    /// Must be finite and non-negative on the truncated domain.
    fn rate(&self, params: &[f64], state: &[u64]) -> f64;
}

impl<F> Propensity for F
where
    F: Fn(&[f64], &[u64]) -> f64 + Send + Sync,
{
    #[inline]
    fn rate(&self, params: &[f64], state: &[u64]) -> f64 {
        self(params, state)
    }
}

/// Box a closure as a propensity.
///
/// Pins the closure signature so argument types need no annotation at the
/// call site.
pub fn from_fn<F>(f: F) -> Box<dyn Propensity>
where
    F: Fn(&[f64], &[u64]) -> f64 + Send + Sync + 'static,
{
    Box::new(f)
}

/// Mass-action kinetics: `θ[parameter] · Π_s x_s (x_s - 1) … (x_s - r_s + 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassAction {
    /// Index of the kinetic parameter scaling this reaction.
    pub parameter: usize,
    /// Reactant multiplicity per species (same length as the state).
    pub reactants: Vec<u64>,
}

impl MassAction {
    /// Create a mass-action propensity.
    pub fn new(parameter: usize, reactants: Vec<u64>) -> Self {
        Self { parameter, reactants }
    }

    /// Combinatorial factor `Π_s x_s^(r_s falling)` (no parameter).
    ///
    /// Returns `NaN` when `state` and `reactants` disagree in length.
    pub fn combinations(&self, state: &[u64]) -> f64 {
        if state.len() != self.reactants.len() {
            return f64::NAN;
        }
        let mut h = 1.0;
        for (&x, &r) in state.iter().zip(&self.reactants) {
            if x < r {
                return 0.0;
            }
            for k in 0..r {
                h *= (x - k) as f64;
            }
        }
        h
    }
}

impl Propensity for MassAction {
    fn rate(&self, params: &[f64], state: &[u64]) -> f64 {
        // Missing parameter surfaces as NaN and is rejected by the generator builder.
        let theta = params.get(self.parameter).copied().unwrap_or(f64::NAN);
        theta * self.combinations(state)
    }
}
