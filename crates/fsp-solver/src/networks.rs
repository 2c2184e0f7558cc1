//! Reference reaction networks.
//!
//! Each parameter scales exactly one reaction, in reaction order.

use fsp_core::traits::from_fn;
use fsp_core::{Crn, MassAction, Propensity};

/// Birth-death process of one species.
///
/// ```text
/// R0: ∅ → S   rate θ0
/// R1: S → ∅   rate θ1 · x
/// ```
///
/// The stationary distribution is Poisson with mean `θ0 / θ1`.
pub fn birth_death() -> Crn {
    build(
        vec![vec![1], vec![-1]],
        vec![mass_action(0, vec![0]), mass_action(1, vec![1])],
    )
}

/// Bursting gene: a two-state promoter `G` driving mRNA `M`.
///
/// ```text
/// R0: G_off → G_on   rate θ0 · (1 - x_G)
/// R1: G_on → G_off   rate θ1 · x_G
/// R2: G_on → G_on + M   rate θ2 · x_G
/// R3: M → ∅          rate θ3 · x_M
/// ```
///
/// Species order is `[G_on, M]`. The promoter count stays in `{0, 1}` when
/// started there; states with `x_G > 1` are enumerated but unreachable.
pub fn bursting_gene() -> Crn {
    build(
        vec![vec![1, 0], vec![-1, 0], vec![0, 1], vec![0, -1]],
        vec![
            from_fn(|p, x| p[0] * 1u64.saturating_sub(x[0]) as f64),
            from_fn(|p, x| p[1] * x[0] as f64),
            from_fn(|p, x| p[2] * x[0] as f64),
            from_fn(|p, x| p[3] * x[1] as f64),
        ],
    )
}

/// Two independent birth-death processes `A` and `B`.
///
/// ```text
/// R0: ∅ → A  θ0      R1: A → ∅  θ1 · x_A
/// R2: ∅ → B  θ2      R3: B → ∅  θ3 · x_B
/// ```
pub fn independent_birth_death() -> Crn {
    build(
        vec![vec![1, 0], vec![-1, 0], vec![0, 1], vec![0, -1]],
        vec![
            mass_action(0, vec![0, 0]),
            mass_action(1, vec![1, 0]),
            mass_action(2, vec![0, 0]),
            mass_action(3, vec![0, 1]),
        ],
    )
}

fn mass_action(parameter: usize, reactants: Vec<u64>) -> Box<dyn Propensity> {
    Box::new(MassAction::new(parameter, reactants))
}

fn build(stoichiometry: Vec<Vec<i64>>, propensities: Vec<Box<dyn Propensity>>) -> Crn {
    let n_params = stoichiometry.len();
    match Crn::new(stoichiometry, propensities, n_params) {
        Ok(crn) => crn,
        // Shapes above are fixed; a failure here is a bug in this module.
        Err(e) => unreachable!("reference network is malformed: {e}"),
    }
}
