//! Chemical reaction network description

use std::fmt;

use crate::traits::Propensity;
use crate::{Error, Result};

/// Species counts of one lattice point.
pub type State = Vec<u64>;

/// Immutable chemical reaction network.
///
/// Stoichiometry is stored reaction-major: row `i` is the net change vector
/// of reaction `i`, one entry per species.
pub struct Crn {
    stoichiometry: Vec<Vec<i64>>,
    propensities: Vec<Box<dyn Propensity>>,
    n_params: usize,
    n_species: usize,
}

impl Crn {
    /// Build a CRN from its change vectors, propensities and parameter count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if there are no reactions or species, if
    /// change vectors have inconsistent lengths, or if the number of
    /// propensities differs from the number of reactions.
    pub fn new(
        stoichiometry: Vec<Vec<i64>>,
        propensities: Vec<Box<dyn Propensity>>,
        n_params: usize,
    ) -> Result<Self> {
        if stoichiometry.is_empty() {
            return Err(Error::Validation("crn: at least one reaction is required".into()));
        }
        let n_species = stoichiometry[0].len();
        if n_species == 0 {
            return Err(Error::Validation("crn: at least one species is required".into()));
        }
        if let Some((i, row)) = stoichiometry.iter().enumerate().find(|(_, r)| r.len() != n_species)
        {
            return Err(Error::Validation(format!(
                "crn: reaction {i} has {} species entries, expected {n_species}",
                row.len()
            )));
        }
        if propensities.len() != stoichiometry.len() {
            return Err(Error::Validation(format!(
                "crn: {} propensities for {} reactions",
                propensities.len(),
                stoichiometry.len()
            )));
        }
        Ok(Self { stoichiometry, propensities, n_params, n_species })
    }

    /// Number of species (lattice dimension).
    pub fn n_species(&self) -> usize {
        self.n_species
    }

    /// Number of reaction channels.
    pub fn n_reactions(&self) -> usize {
        self.stoichiometry.len()
    }

    /// Number of kinetic parameters.
    pub fn n_params(&self) -> usize {
        self.n_params
    }

    /// Change vector of reaction `index`.
    pub fn change_vector(&self, index: usize) -> Option<&[i64]> {
        self.stoichiometry.get(index).map(Vec::as_slice)
    }

    /// Full stoichiometry (reaction-major).
    pub fn stoichiometry(&self) -> &[Vec<i64>] {
        &self.stoichiometry
    }

    /// Propensity of reaction `index`.
    pub fn propensity(&self, index: usize) -> Option<&dyn Propensity> {
        self.propensities.get(index).map(Box::as_ref)
    }
}

impl fmt::Debug for Crn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crn")
            .field("stoichiometry", &self.stoichiometry)
            .field("n_params", &self.n_params)
            .field("n_species", &self.n_species)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MassAction, from_fn};

    fn birth_death() -> Crn {
        Crn::new(
            vec![vec![1], vec![-1]],
            vec![from_fn(|p, _| p[0]), Box::new(MassAction::new(1, vec![1]))],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_counts() {
        let crn = birth_death();
        assert_eq!(crn.n_species(), 1);
        assert_eq!(crn.n_reactions(), 2);
        assert_eq!(crn.n_params(), 2);
        assert_eq!(crn.change_vector(1), Some(&[-1i64][..]));
        assert!(crn.change_vector(2).is_none());
        assert_eq!(crn.propensity(1).unwrap().rate(&[1.0, 2.0], &[3]), 6.0);
    }

    #[test]
    fn test_rejects_ragged_stoichiometry() {
        let err = Crn::new(
            vec![vec![1, 0], vec![-1]],
            vec![from_fn(|_, _| 1.0), from_fn(|_, _| 1.0)],
            2,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_rejects_propensity_count_mismatch() {
        assert!(Crn::new(vec![vec![1]], vec![], 1).is_err());
        assert!(Crn::new(vec![], vec![], 0).is_err());
        assert!(Crn::new(vec![vec![]], vec![from_fn(|_, _| 1.0)], 1).is_err());
    }

    #[test]
    fn test_debug_omits_closures() {
        let s = format!("{:?}", birth_death());
        assert!(s.contains("n_species: 1"));
    }
}
