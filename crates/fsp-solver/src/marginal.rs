//! Joint and marginal probability/sensitivity trajectories.

use fsp_core::{Error, Result};
use nalgebra::DMatrix;

use crate::enumeration::StateSpaceEnumeration;

/// Joint probabilities and sensitivities over the truncated state space.
#[derive(Debug, Clone)]
pub struct SensitivityTrajectory {
    /// Output times.
    pub times: Vec<f64>,
    /// `Σ p` of the initial condition (1 for a normalised start).
    pub initial_mass: f64,
    /// `n_times × n_states`; row `k` is `p(t_k)`.
    pub probabilities: DMatrix<f64>,
    /// One `n_states × n_params` matrix per output time; column `i` is `∂p/∂θ_i`.
    pub sensitivities: Vec<DMatrix<f64>>,
}

impl SensitivityTrajectory {
    /// Number of output times.
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// Number of enumerated states.
    pub fn n_states(&self) -> usize {
        self.probabilities.ncols()
    }

    /// Number of kinetic parameters.
    pub fn n_params(&self) -> usize {
        self.sensitivities.first().map_or(0, |s| s.ncols())
    }

    /// Total probability inside the truncated domain at each output time.
    pub fn retained_mass(&self) -> Vec<f64> {
        self.probabilities.row_iter().map(|r| r.sum()).collect()
    }

    /// Probability that has left the truncated domain, `initial_mass - Σ p`,
    /// at each output time.
    pub fn truncation_loss(&self) -> Vec<f64> {
        self.retained_mass().into_iter().map(|m| self.initial_mass - m).collect()
    }

    /// Project onto the count of species `species`.
    pub fn marginalize(
        &self,
        space: &StateSpaceEnumeration,
        species: usize,
    ) -> Result<MarginalDistribution> {
        if species >= space.dim() {
            return Err(Error::Validation(format!(
                "marginal: species index {species} >= n_species={}",
                space.dim()
            )));
        }
        if space.n_states() != self.n_states() {
            return Err(Error::Validation(format!(
                "marginal: trajectory has {} states, enumeration has {}",
                self.n_states(),
                space.n_states()
            )));
        }
        let n_counts = space.cr() as usize + 1;
        let n_times = self.n_times();
        let n_params = self.n_params();

        let mut probabilities = DMatrix::zeros(n_times, n_counts);
        let mut sensitivities = vec![DMatrix::zeros(n_counts, n_params); n_times];

        for (idx, state) in space.iter() {
            let k = state[species] as usize;
            if k >= n_counts {
                return Err(Error::Computation(format!(
                    "marginal: state {state:?} exceeds Cr={}",
                    space.cr()
                )));
            }
            for t in 0..n_times {
                probabilities[(t, k)] += self.probabilities[(t, idx)];
                for j in 0..n_params {
                    sensitivities[t][(k, j)] += self.sensitivities[t][(idx, j)];
                }
            }
        }

        Ok(MarginalDistribution { species, times: self.times.clone(), probabilities, sensitivities })
    }
}

/// Distribution of one species' count over time, with parameter sensitivities.
#[derive(Debug, Clone)]
pub struct MarginalDistribution {
    /// Species index.
    pub species: usize,
    /// Output times.
    pub times: Vec<f64>,
    /// `n_times × (Cr + 1)`; entry `(t, k)` is `P(X_t = k)`.
    pub probabilities: DMatrix<f64>,
    /// One `(Cr + 1) × n_params` matrix per output time.
    pub sensitivities: Vec<DMatrix<f64>>,
}

impl MarginalDistribution {
    /// Number of output times.
    pub fn n_times(&self) -> usize {
        self.times.len()
    }

    /// Number of kinetic parameters.
    pub fn n_params(&self) -> usize {
        self.sensitivities.first().map_or(0, |s| s.ncols())
    }

    /// `E[f(X_t)]` at each output time.
    pub fn expectation<F: Fn(u64) -> f64>(&self, f: F) -> Vec<f64> {
        let weights: Vec<f64> = (0..self.probabilities.ncols()).map(|k| f(k as u64)).collect();
        self.probabilities
            .row_iter()
            .map(|row| row.iter().zip(&weights).map(|(p, w)| p * w).sum())
            .collect()
    }

    /// `∂E[f(X_t)]/∂θ` as an `n_times × n_params` matrix.
    pub fn expectation_gradient<F: Fn(u64) -> f64>(&self, f: F) -> DMatrix<f64> {
        let n_params = self.n_params();
        let mut grad = DMatrix::zeros(self.n_times(), n_params);
        for (t, s) in self.sensitivities.iter().enumerate() {
            for k in 0..s.nrows() {
                let w = f(k as u64);
                if w == 0.0 {
                    continue;
                }
                for j in 0..n_params {
                    grad[(t, j)] += w * s[(k, j)];
                }
            }
        }
        grad
    }

    /// Mean count at each output time.
    pub fn mean(&self) -> Vec<f64> {
        self.expectation(|k| k as f64)
    }

    /// Total marginal probability at each output time.
    pub fn retained_mass(&self) -> Vec<f64> {
        self.probabilities.row_iter().map(|r| r.sum()).collect()
    }
}
