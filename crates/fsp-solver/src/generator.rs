//! Sparse CME generators over the truncated state space (Fox & Munsky 2019).
//!
//! - `B_i`: rate matrix of reaction `i` with its propensity evaluated at a unit
//!   parameter vector. Entry `(dest, src)` holds the rate of `src → dest`, the
//!   diagonal holds minus the total outflow of `src`.
//! - `A = Σ_i θ_i B_i`: the CME generator, `dp/dt = A p`.
//! - `[[A, 0], [B_i, A]]`: drives `d/dt [p; S_i]`, since `∂A/∂θ_i = B_i`.
//!
//! Outflow is computed before truncation: transitions whose destination leaves
//! the enumerated domain still drain the source state but are not redirected
//! anywhere, so probability leaks out (the FSP approximation).

use fsp_core::{Crn, Error, Result};
use sprs::{CsMat, TriMat};

use crate::enumeration::StateSpaceEnumeration;

/// Build the parameter-free rate matrix `B_index`.
///
/// # Errors
///
/// [`Error::Validation`] if `index` is out of range or the propensity returns
/// a negative or non-finite rate anywhere on the domain.
pub fn rate_matrix(crn: &Crn, space: &StateSpaceEnumeration, index: usize) -> Result<CsMat<f64>> {
    let (change, propensity) = match (crn.change_vector(index), crn.propensity(index)) {
        (Some(c), Some(p)) => (c, p),
        _ => {
            return Err(Error::Validation(format!(
                "rate_matrix: reaction index {index} out of range (n_reactions={})",
                crn.n_reactions()
            )));
        }
    };
    let n = space.n_states();
    let unit = vec![1.0; crn.n_params()];
    let is_null = change.iter().all(|&c| c == 0);

    let mut tri = TriMat::with_capacity((n, n), 2 * n);
    let mut dest = vec![0u64; change.len()];
    let mut dropped = 0usize;

    for (src, x) in space.iter() {
        let rate = propensity.rate(&unit, x);
        if !rate.is_finite() || rate < 0.0 {
            return Err(Error::Validation(format!(
                "rate_matrix: reaction {index} has invalid propensity {rate} at state {x:?}"
            )));
        }
        // A null reaction leaves the state unchanged: zero net contribution.
        if rate == 0.0 || is_null {
            continue;
        }
        tri.add_triplet(src, src, -rate);
        match shifted(x, change, &mut dest).then(|| space.index_of(&dest)).flatten() {
            Some(d) => tri.add_triplet(d, src, rate),
            None => dropped += 1,
        }
    }

    let b: CsMat<f64> = tri.to_csr();
    log::debug!("rate_matrix: reaction={index} n={n} nnz={} truncated_transitions={dropped}", b.nnz());
    Ok(b)
}

/// `dest = x + change`; `false` if any coordinate goes negative.
fn shifted(x: &[u64], change: &[i64], dest: &mut [u64]) -> bool {
    for ((d, &xi), &ci) in dest.iter_mut().zip(x).zip(change) {
        match xi.checked_add_signed(ci) {
            Some(v) => *d = v,
            None => return false,
        }
    }
    true
}

/// `Σ_i weights[i] · mats[i]`, dropping exact zeros.
pub fn linear_combination(mats: &[CsMat<f64>], weights: &[f64]) -> Result<CsMat<f64>> {
    if mats.len() != weights.len() {
        return Err(Error::Validation(format!(
            "linear_combination: {} matrices for {} weights",
            mats.len(),
            weights.len()
        )));
    }
    let Some(first) = mats.first() else {
        return Err(Error::Validation("linear_combination: no matrices".into()));
    };
    let shape = first.shape();
    if let Some(m) = mats.iter().find(|m| m.shape() != shape) {
        return Err(Error::Validation(format!(
            "linear_combination: shape {:?} != {:?}",
            m.shape(),
            shape
        )));
    }

    let nnz = mats.iter().map(|m| m.nnz()).sum();
    let mut tri = TriMat::with_capacity(shape, nnz);
    for (m, &w) in mats.iter().zip(weights) {
        if w == 0.0 {
            continue;
        }
        for (&v, (row, col)) in m.iter() {
            tri.add_triplet(row, col, w * v);
        }
    }
    Ok(drop_zeros(tri.to_csr()))
}

/// Block matrix `[[a, 0], [b, a]]`.
pub fn block_matrix(a: &CsMat<f64>, b: &CsMat<f64>) -> Result<CsMat<f64>> {
    let (n, m) = a.shape();
    if n != m || b.shape() != (n, n) {
        return Err(Error::Validation(format!(
            "block_matrix: A must be square and B the same shape, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    let mut tri = TriMat::with_capacity((2 * n, 2 * n), 2 * a.nnz() + b.nnz());
    for (&v, (row, col)) in a.iter() {
        tri.add_triplet(row, col, v);
        tri.add_triplet(row + n, col + n, v);
    }
    for (&v, (row, col)) in b.iter() {
        tri.add_triplet(row + n, col, v);
    }
    Ok(tri.to_csr())
}

/// Rebuild `m` without explicitly stored zeros.
fn drop_zeros(m: CsMat<f64>) -> CsMat<f64> {
    if m.data().iter().all(|&v| v != 0.0) {
        return m;
    }
    let mut tri = TriMat::with_capacity(m.shape(), m.nnz());
    for (&v, (row, col)) in m.iter() {
        if v != 0.0 {
            tri.add_triplet(row, col, v);
        }
    }
    tri.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks;
    use fsp_core::traits::from_fn;

    fn dense(m: &CsMat<f64>) -> Vec<Vec<f64>> {
        let mut d = vec![vec![0.0; m.cols()]; m.rows()];
        for (&v, (r, c)) in m.iter() {
            d[r][c] += v;
        }
        d
    }

    #[test]
    fn birth_matrix_drops_flux_at_boundary() {
        let crn = networks::birth_death();
        let space = StateSpaceEnumeration::new(3, 1).unwrap();
        let b = dense(&rate_matrix(&crn, &space, 0).unwrap());
        // Birth at unit rate from every state; the last one leaks.
        for s in 0..4 {
            assert_eq!(b[s][s], -1.0);
        }
        for s in 0..3 {
            assert_eq!(b[s + 1][s], 1.0);
        }
        let col_sum = |c: usize| (0..4).map(|r| b[r][c]).sum::<f64>();
        assert_eq!(col_sum(0), 0.0);
        assert_eq!(col_sum(3), -1.0);
    }

    #[test]
    fn death_matrix_conserves_mass() {
        let crn = networks::birth_death();
        let space = StateSpaceEnumeration::new(4, 1).unwrap();
        let m = rate_matrix(&crn, &space, 1).unwrap();
        let b = dense(&m);
        for s in 0..5 {
            assert_eq!(b[s][s], -(s as f64));
            let col: f64 = (0..5).map(|r| b[r][s]).sum();
            assert_eq!(col, 0.0);
        }
        // State 0 has zero propensity: nothing stored in its column.
        assert!(m.iter().all(|(_, (_, c))| c != 0));
    }

    #[test]
    fn null_reaction_contributes_nothing() {
        let crn = Crn::new(vec![vec![0]], vec![from_fn(|_, _| 2.0)], 1).unwrap();
        let space = StateSpaceEnumeration::new(3, 1).unwrap();
        assert_eq!(rate_matrix(&crn, &space, 0).unwrap().nnz(), 0);
    }

    #[test]
    fn invalid_propensities_rejected() {
        let crn = Crn::new(vec![vec![1]], vec![from_fn(|_, x| 1.0 - x[0] as f64)], 1).unwrap();
        let space = StateSpaceEnumeration::new(3, 1).unwrap();
        assert!(matches!(rate_matrix(&crn, &space, 0), Err(Error::Validation(_))));

        let crn = Crn::new(vec![vec![1]], vec![from_fn(|_, _| f64::INFINITY)], 1).unwrap();
        assert!(matches!(rate_matrix(&crn, &space, 0), Err(Error::Validation(_))));
        assert!(matches!(rate_matrix(&crn, &space, 1), Err(Error::Validation(_))));
    }

    #[test]
    fn two_species_boundary_and_interior_columns() {
        let crn = networks::bursting_gene();
        let space = StateSpaceEnumeration::new(5, 2).unwrap();
        // mRNA production: x0 * θ, change (0, +1).
        let b = dense(&rate_matrix(&crn, &space, 2).unwrap());
        for (src, x) in space.iter() {
            let col: f64 = (0..space.n_states()).map(|r| b[r][src]).sum();
            let rate = x[0] as f64;
            assert_eq!(b[src][src], -rate);
            if space.index_of(&[x[0], x[1] + 1]).is_some() {
                assert_eq!(col, 0.0, "interior column {x:?}");
            } else {
                assert_eq!(col, -rate, "boundary column {x:?}");
            }
        }
    }

    #[test]
    fn linear_combination_scales_and_sums() {
        let crn = networks::birth_death();
        let space = StateSpaceEnumeration::new(4, 1).unwrap();
        let bs: Vec<_> = (0..2).map(|i| rate_matrix(&crn, &space, i).unwrap()).collect();
        let a = dense(&linear_combination(&bs, &[2.0, 0.5]).unwrap());
        assert_eq!(a[2][2], -2.0 - 0.5 * 2.0);
        assert_eq!(a[3][2], 2.0);
        assert_eq!(a[1][2], 1.0);

        let only_birth = linear_combination(&bs, &[1.0, 0.0]).unwrap();
        assert_eq!(only_birth.nnz(), bs[0].nnz());
        assert!(linear_combination(&bs, &[1.0]).is_err());
        assert!(linear_combination(&[], &[]).is_err());
    }

    #[test]
    fn block_matrix_layout() {
        let crn = networks::birth_death();
        let space = StateSpaceEnumeration::new(2, 1).unwrap();
        let bs: Vec<_> = (0..2).map(|i| rate_matrix(&crn, &space, i).unwrap()).collect();
        let a = linear_combination(&bs, &[1.5, 1.0]).unwrap();
        let c = block_matrix(&a, &bs[1]).unwrap();
        assert_eq!(c.shape(), (6, 6));
        let (da, db, dc) = (dense(&a), dense(&bs[1]), dense(&c));
        for r in 0..3 {
            for col in 0..3 {
                assert_eq!(dc[r][col], da[r][col]);
                assert_eq!(dc[r][col + 3], 0.0);
                assert_eq!(dc[r + 3][col], db[r][col]);
                assert_eq!(dc[r + 3][col + 3], da[r][col]);
            }
        }
        assert!(block_matrix(&a, &block_matrix(&a, &a).unwrap()).is_err());
    }

    #[test]
    fn drop_zeros_removes_cancellations() {
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 1.0);
        tri.add_triplet(0, 0, -1.0);
        tri.add_triplet(1, 0, 3.0);
        let m = drop_zeros(tri.to_csr());
        assert_eq!(m.nnz(), 1);
    }
}
