//! JSON network documents for `fsp marginal`.

use anyhow::{Result, bail};
use fsp_core::{Crn, MassAction, Propensity};
use fsp_solver::{FspSolver, SolverConfig};
use serde::Deserialize;

/// One mass-action reaction. Reaction `i` is scaled by `parameters[i]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionJson {
    /// Net change vector.
    pub change: Vec<i64>,
    /// Reactant multiplicities; omitted means a zeroth-order source.
    #[serde(default)]
    pub reactants: Option<Vec<u64>>,
}

/// Input document: network, parameters, initial condition and output grid.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkDocument {
    /// Rate constants, one per reaction.
    pub parameters: Vec<f64>,
    /// Deterministic initial species counts.
    pub initial_state: Vec<u64>,
    /// Species to marginalize onto; defaults to all.
    #[serde(default)]
    pub species_of_interest: Option<Vec<usize>>,
    /// Output times (sorted, non-negative).
    pub times: Vec<f64>,
    /// Reactions.
    pub reactions: Vec<ReactionJson>,
    /// Truncation, integrator and diagnostics settings (`cr`, `ode`, `method`, ...).
    #[serde(flatten)]
    pub config: SolverConfig,
}

impl NetworkDocument {
    /// Build the mass-action reaction network.
    pub fn crn(&self) -> Result<Crn> {
        let n_species = self.reactions.first().map_or(0, |r| r.change.len());
        let mut stoichiometry = Vec::with_capacity(self.reactions.len());
        let mut propensities: Vec<Box<dyn Propensity>> = Vec::with_capacity(self.reactions.len());
        for (i, r) in self.reactions.iter().enumerate() {
            let reactants = r.reactants.clone().unwrap_or_else(|| vec![0; n_species]);
            if reactants.len() != n_species {
                bail!("reaction {i}: {} reactant entries, expected {n_species}", reactants.len());
            }
            stoichiometry.push(r.change.clone());
            propensities.push(Box::new(MassAction::new(i, reactants)));
        }
        let n_params = self.reactions.len();
        Ok(Crn::new(stoichiometry, propensities, n_params)?)
    }

    /// Build the solver and check the document against it.
    pub fn solver(&self) -> Result<FspSolver> {
        let fsp = FspSolver::new(self.crn()?, self.config.clone())?;
        if self.parameters.len() != fsp.crn().n_reactions() {
            bail!(
                "{} parameters for {} reactions",
                self.parameters.len(),
                fsp.crn().n_reactions()
            );
        }
        if self.initial_state.len() != fsp.crn().n_species() {
            bail!(
                "initial_state has {} species, network has {}",
                self.initial_state.len(),
                fsp.crn().n_species()
            );
        }
        Ok(fsp)
    }

    /// Species to report, in request order.
    pub fn species(&self, n_species: usize) -> Vec<usize> {
        self.species_of_interest.clone().unwrap_or_else(|| (0..n_species).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "cr": 10,
        "parameters": [2.0, 1.0],
        "initial_state": [0],
        "times": [1.0],
        "reactions": [
            { "change": [1] },
            { "change": [-1], "reactants": [1] }
        ],
        "ode": { "rtol": 1e-8 }
    }"#;

    #[test]
    fn parses_document_with_defaults() {
        let doc: NetworkDocument = serde_json::from_str(DOC).unwrap();
        assert_eq!(doc.config.cr, 10);
        assert_eq!(doc.config.ode.rtol, 1e-8);
        assert!(doc.config.parallel);
        let fsp = doc.solver().unwrap();
        assert_eq!(fsp.n_states(), 11);
        assert_eq!(doc.species(1), vec![0]);
        let birth = fsp.crn().propensity(0).unwrap();
        assert_eq!(birth.rate(&[2.0, 1.0], &[7]), 2.0);
    }

    #[test]
    fn rejects_inconsistent_documents() {
        let mut doc: NetworkDocument = serde_json::from_str(DOC).unwrap();
        doc.parameters.push(1.0);
        assert!(doc.solver().is_err());

        let mut doc: NetworkDocument = serde_json::from_str(DOC).unwrap();
        doc.reactions[1].reactants = Some(vec![1, 0]);
        assert!(doc.crn().is_err());

        let mut doc: NetworkDocument = serde_json::from_str(DOC).unwrap();
        doc.initial_state = vec![0, 0];
        assert!(doc.solver().is_err());
    }
}
