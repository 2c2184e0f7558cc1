//! Forward sensitivities of the truncated CME.
//!
//! For each reaction `i` the augmented system
//!
//! ```text
//! d/dt [p; S_i] = [[A, 0], [B_i, A]] · [p; S_i]
//! ```
//!
//! is integrated independently. `S_i = ∂p/∂θ_i` because every propensity is
//! linear in its own parameter, so `∂A/∂θ_i = B_i`.

use std::collections::BTreeMap;

use fsp_core::{Crn, Error, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use sprs::CsMat;

use crate::config::{OdeMethod, SolverConfig};
use crate::enumeration::StateSpaceEnumeration;
use crate::generator::{block_matrix, linear_combination, rate_matrix};
use crate::marginal::{MarginalDistribution, SensitivityTrajectory};
use crate::ode::{LinearSparseOde, OdeSolution, rk4_linear};
use crate::ode_adaptive::rk45_at;

/// FSP solver for one reaction network at a fixed truncation.
#[derive(Debug)]
pub struct FspSolver {
    crn: Crn,
    space: StateSpaceEnumeration,
    config: SolverConfig,
}

impl FspSolver {
    /// Build the state-space bijection for `crn` under `config`.
    ///
    /// Every parameter must scale exactly one reaction, so `crn.n_params()`
    /// has to equal `crn.n_reactions()`.
    pub fn new(crn: Crn, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        if crn.n_params() != crn.n_reactions() {
            return Err(Error::Validation(format!(
                "fsp: expected one parameter per reaction, got n_params={} n_reactions={}",
                crn.n_params(),
                crn.n_reactions()
            )));
        }
        let space = StateSpaceEnumeration::new(config.cr, crn.n_species())?;
        log::debug!(
            "fsp: species={} reactions={} cr={} n_states={}",
            crn.n_species(),
            crn.n_reactions(),
            config.cr,
            space.n_states()
        );
        Ok(Self { crn, space, config })
    }

    /// Default configuration with truncation `cr`.
    pub fn with_cr(crn: Crn, cr: u64) -> Result<Self> {
        Self::new(crn, SolverConfig::with_cr(cr))
    }

    /// The reaction network.
    pub fn crn(&self) -> &Crn {
        &self.crn
    }

    /// The state-space bijection.
    pub fn enumeration(&self) -> &StateSpaceEnumeration {
        &self.space
    }

    /// Active configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Number of states in the truncated domain.
    pub fn n_states(&self) -> usize {
        self.space.n_states()
    }

    /// Parameter-free rate matrix of reaction `index`.
    pub fn create_b(&self, index: usize) -> Result<CsMat<f64>> {
        rate_matrix(&self.crn, &self.space, index)
    }

    /// CME generator `A = Σ_i params[i] · B_i`.
    pub fn create_a(&self, params: &[f64]) -> Result<CsMat<f64>> {
        self.check_params(params)?;
        let bs = self.all_b()?;
        linear_combination(&bs, params)
    }

    /// Block matrix `[[A, 0], [B_index, A]]`.
    pub fn constant_matrix(&self, params: &[f64], index: usize) -> Result<CsMat<f64>> {
        let a = self.create_a(params)?;
        let b = self.create_b(index)?;
        block_matrix(&a, &b)
    }

    /// Integrate the augmented system of reaction `index` from `t0` to `tf`,
    /// reporting `[p; S_index]` at each time in `t_eval`.
    pub fn solve_ode(
        &self,
        init_state: &[f64],
        t0: f64,
        tf: f64,
        params: &[f64],
        index: usize,
        t_eval: &[f64],
    ) -> Result<OdeSolution> {
        self.check_init_row(init_state, index)?;
        check_time_grid(t0, tf, t_eval)?;
        let m = self.constant_matrix(params, index)?;
        self.integrate(m, init_state, t0, t_eval)
    }

    /// Probabilities and sensitivities to every parameter at each time in
    /// `t_eval`. `init_state` holds one `[p0; S0]` row per reaction.
    pub fn get_sensitivities(
        &self,
        init_state: &[Vec<f64>],
        t0: f64,
        tf: f64,
        params: &[f64],
        t_eval: &[f64],
    ) -> Result<SensitivityTrajectory> {
        let n_r = self.crn.n_reactions();
        if init_state.len() != n_r {
            return Err(Error::Validation(format!(
                "get_sensitivities: expected {n_r} initial-state rows, got {}",
                init_state.len()
            )));
        }
        for (i, row) in init_state.iter().enumerate() {
            self.check_init_row(row, i)?;
        }
        check_time_grid(t0, tf, t_eval)?;
        self.check_params(params)?;

        let bs = self.all_b()?;
        let a = linear_combination(&bs, params)?;

        let solve = |i: usize| -> Result<OdeSolution> {
            let m = block_matrix(&a, &bs[i])?;
            self.integrate(m, &init_state[i], t0, t_eval)
        };
        let solutions: Vec<OdeSolution> = if self.config.parallel {
            (0..n_r).into_par_iter().map(solve).collect::<Result<_>>()?
        } else {
            (0..n_r).map(solve).collect::<Result<_>>()?
        };

        let initial_mass = init_state[0][..self.n_states()].iter().sum();
        let traj = self.assemble(t_eval, &solutions, initial_mass)?;
        if let Some(&loss) = traj.truncation_loss().last() {
            if loss > self.config.mass_loss_warning {
                log::warn!(
                    "fsp: {loss:.3e} probability left the truncated domain by t={} (cr={}); consider a larger cr",
                    t_eval.last().copied().unwrap_or(tf),
                    self.config.cr
                );
            }
        }
        Ok(traj)
    }

    /// Marginal distribution of species `ind_species` at `time_samples`,
    /// integrating from `t0` to the last sample.
    pub fn marginal(
        &self,
        ind_species: usize,
        init_state: &[Vec<f64>],
        time_samples: &[f64],
        params: &[f64],
        t0: f64,
    ) -> Result<MarginalDistribution> {
        self.check_species(ind_species)?;
        let traj = self.trajectory(init_state, time_samples, params, t0)?;
        traj.marginalize(&self.space, ind_species)
    }

    /// Marginals of several species from a single integration starting at `t = 0`.
    pub fn marginals(
        &self,
        ind_species: &[usize],
        init_state: &[Vec<f64>],
        time_samples: &[f64],
        params: &[f64],
    ) -> Result<BTreeMap<usize, MarginalDistribution>> {
        for &s in ind_species {
            self.check_species(s)?;
        }
        let traj = self.trajectory(init_state, time_samples, params, 0.0)?;
        ind_species
            .iter()
            .map(|&s| Ok((s, traj.marginalize(&self.space, s)?)))
            .collect()
    }

    /// Initial rows for a deterministic start at `state`: `p = δ_state`, `S = 0`.
    pub fn point_mass_initial_state(&self, state: &[u64]) -> Result<Vec<Vec<f64>>> {
        let Some(idx) = self.space.index_of(state) else {
            return Err(Error::Validation(format!(
                "initial state {state:?} is outside the truncated domain (cr={}, n_species={})",
                self.config.cr,
                self.space.dim()
            )));
        };
        let mut row = vec![0.0; 2 * self.n_states()];
        row[idx] = 1.0;
        Ok(vec![row; self.crn.n_reactions()])
    }

    fn trajectory(
        &self,
        init_state: &[Vec<f64>],
        time_samples: &[f64],
        params: &[f64],
        t0: f64,
    ) -> Result<SensitivityTrajectory> {
        let Some(&tf) = time_samples.last() else {
            return Err(Error::Validation("marginal: time_samples must not be empty".into()));
        };
        self.get_sensitivities(init_state, t0, tf, params, time_samples)
    }

    fn integrate(&self, m: CsMat<f64>, y0: &[f64], t0: f64, t_eval: &[f64]) -> Result<OdeSolution> {
        let sol = match self.config.method {
            OdeMethod::Rk45 => {
                let sys = LinearSparseOde::new(m)?;
                rk45_at(&sys, y0, t0, t_eval, &self.config.ode)?
            }
            OdeMethod::Rk4 { dt } => rk4_linear(&m, y0, t0, t_eval, dt, self.config.ode.max_steps)?,
        };
        if sol.y.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::Integration("fsp: solution contains non-finite values".into()));
        }
        Ok(sol)
    }

    fn assemble(
        &self,
        t_eval: &[f64],
        solutions: &[OdeSolution],
        initial_mass: f64,
    ) -> Result<SensitivityTrajectory> {
        let n = self.n_states();
        let n_t = t_eval.len();
        let n_p = self.crn.n_params();
        if solutions.iter().any(|s| s.y.len() != n_t || s.y.iter().any(|y| y.len() != 2 * n)) {
            return Err(Error::Computation("fsp: integrator returned a malformed solution".into()));
        }

        let mut probabilities = DMatrix::zeros(n_t, n);
        let mut sensitivities = vec![DMatrix::zeros(n, n_p); n_t];
        for (i, sol) in solutions.iter().enumerate() {
            for (k, y) in sol.y.iter().enumerate() {
                if i == 0 {
                    probabilities.row_mut(k).iter_mut().zip(&y[..n]).for_each(|(d, &v)| *d = v);
                }
                sensitivities[k].column_mut(i).iter_mut().zip(&y[n..]).for_each(|(d, &v)| *d = v);
            }
        }
        Ok(SensitivityTrajectory {
            times: t_eval.to_vec(),
            initial_mass,
            probabilities,
            sensitivities,
        })
    }

    fn all_b(&self) -> Result<Vec<CsMat<f64>>> {
        (0..self.crn.n_reactions()).map(|i| self.create_b(i)).collect()
    }

    fn check_params(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.crn.n_params() {
            return Err(Error::Validation(format!(
                "fsp: expected {} parameters, got {}",
                self.crn.n_params(),
                params.len()
            )));
        }
        if let Some((i, p)) = params.iter().enumerate().find(|(_, p)| !p.is_finite() || **p < 0.0) {
            return Err(Error::Validation(format!("fsp: parameter {i} must be finite and >= 0, got {p}")));
        }
        Ok(())
    }

    fn check_init_row(&self, row: &[f64], index: usize) -> Result<()> {
        let expected = 2 * self.n_states();
        if row.len() != expected {
            return Err(Error::Validation(format!(
                "fsp: initial state for reaction {index} has length {}, expected 2*n_states={expected}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(format!(
                "fsp: initial state for reaction {index} must be finite"
            )));
        }
        Ok(())
    }

    fn check_species(&self, species: usize) -> Result<()> {
        if species >= self.crn.n_species() {
            return Err(Error::Validation(format!(
                "fsp: species index {species} >= n_species={}",
                self.crn.n_species()
            )));
        }
        Ok(())
    }
}

fn check_time_grid(t0: f64, tf: f64, t_eval: &[f64]) -> Result<()> {
    if !t0.is_finite() || !tf.is_finite() || tf < t0 {
        return Err(Error::Validation(format!("fsp: need finite t0 <= tf, got t0={t0} tf={tf}")));
    }
    if t_eval.is_empty() {
        return Err(Error::Validation("fsp: t_eval must not be empty".into()));
    }
    if t_eval.windows(2).any(|w| !(w[0] <= w[1])) {
        return Err(Error::Validation("fsp: t_eval must be sorted".into()));
    }
    if t_eval.iter().any(|&t| !(t0..=tf).contains(&t)) {
        return Err(Error::Validation(format!("fsp: t_eval must lie within [{t0}, {tf}]")));
    }
    Ok(())
}
