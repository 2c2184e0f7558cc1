//! Linear ODE systems over sparse matrices.
//!
//! Baseline deterministic integrator: classic fixed-step RK4 for
//! `dy/dt = M y` with constant sparse `M`.
//!
//! # Step policy (documented)
//! - Integrates forward in time only.
//! - Uses a fixed step size `dt` **except** where a step is shortened so the
//!   solution lands exactly on the next output time.
//! - A hard `max_steps` guard prevents runaway loops for tiny `dt`.

use fsp_core::{Error, Result};
use sprs::CsMat;

use crate::ode_adaptive::OdeSystem;

/// ODE solution as a time grid + states.
#[derive(Debug, Clone)]
pub struct OdeSolution {
    /// Time points.
    pub t: Vec<f64>,
    /// State vectors aligned with `t`.
    pub y: Vec<Vec<f64>>,
}

impl OdeSolution {
    pub(crate) fn push(&mut self, t: f64, y: &[f64]) {
        self.t.push(t);
        self.y.push(y.to_vec());
    }
}

/// `out = M x` for a CSR or CSC matrix.
pub fn spmv(m: &CsMat<f64>, x: &[f64], out: &mut [f64]) {
    out.iter_mut().for_each(|v| *v = 0.0);
    if m.is_csr() {
        for (row, vec) in m.outer_iterator().enumerate() {
            out[row] = vec.iter().map(|(col, &v)| v * x[col]).sum();
        }
    } else {
        for (col, vec) in m.outer_iterator().enumerate() {
            let xc = x[col];
            if xc != 0.0 {
                for (row, &v) in vec.iter() {
                    out[row] += v * xc;
                }
            }
        }
    }
}

/// Time-invariant linear system `dx/dt = M x`.
#[derive(Debug, Clone)]
pub struct LinearSparseOde {
    matrix: CsMat<f64>,
}

impl LinearSparseOde {
    /// Wrap a square matrix.
    pub fn new(matrix: CsMat<f64>) -> Result<Self> {
        if matrix.rows() != matrix.cols() {
            return Err(Error::Validation(format!(
                "linear ode: matrix must be square, got {}x{}",
                matrix.rows(),
                matrix.cols()
            )));
        }
        if matrix.data().iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("linear ode: matrix must be finite".into()));
        }
        Ok(Self { matrix })
    }

    /// The coefficient matrix.
    pub fn matrix(&self) -> &CsMat<f64> {
        &self.matrix
    }
}

impl OdeSystem for LinearSparseOde {
    fn ndim(&self) -> usize {
        self.matrix.rows()
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        spmv(&self.matrix, y, dydt);
    }
}

/// Integrate `dy/dt = M y` with fixed-step RK4, reporting the state at each
/// time in `t_eval` (non-decreasing, `>= t0`).
pub fn rk4_linear(
    m: &CsMat<f64>,
    y0: &[f64],
    t0: f64,
    t_eval: &[f64],
    dt: f64,
    max_steps: usize,
) -> Result<OdeSolution> {
    if !t0.is_finite() || t_eval.iter().any(|t| !t.is_finite()) {
        return Err(Error::Validation("rk4_linear: times must be finite".to_string()));
    }
    if t_eval.windows(2).any(|w| w[1] < w[0]) || t_eval.first().is_some_and(|&t| t < t0) {
        return Err(Error::Validation(
            "rk4_linear: t_eval must be non-decreasing and >= t0".to_string(),
        ));
    }
    if !dt.is_finite() || dt <= 0.0 {
        return Err(Error::Validation("rk4_linear: dt must be finite and > 0".to_string()));
    }
    if max_steps == 0 {
        return Err(Error::Validation("rk4_linear: max_steps must be > 0".to_string()));
    }
    let n = y0.len();
    if m.rows() != n || m.cols() != n {
        return Err(Error::Validation(format!(
            "rk4_linear: M must be square (n x n) with n=len(y0)={}, got {}x{}",
            n,
            m.rows(),
            m.cols()
        )));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("rk4_linear: y0 must be finite".to_string()));
    }

    let mut sol = OdeSolution { t: Vec::with_capacity(t_eval.len()), y: Vec::new() };
    let mut t = t0;
    let mut y = y0.to_vec();
    let (mut k1, mut k2, mut k3, mut k4) = (vec![0.0; n], vec![0.0; n], vec![0.0; n], vec![0.0; n]);
    let mut tmp = vec![0.0; n];
    let mut steps = 0usize;

    for &target in t_eval {
        while t < target {
            if steps == max_steps {
                return Err(Error::Integration(format!(
                    "rk4_linear: exceeded max_steps={max_steps} before reaching t={target}"
                )));
            }
            steps += 1;
            let h = (target - t).min(dt);

            // f(t, y) = M y  (time-independent)
            spmv(m, &y, &mut k1);
            axpy_into(&y, 0.5 * h, &k1, &mut tmp);
            spmv(m, &tmp, &mut k2);
            axpy_into(&y, 0.5 * h, &k2, &mut tmp);
            spmv(m, &tmp, &mut k3);
            axpy_into(&y, h, &k3, &mut tmp);
            spmv(m, &tmp, &mut k4);

            for i in 0..n {
                y[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
            }
            t = if h == target - t { target } else { t + h };

            if y.iter().any(|v| !v.is_finite()) {
                return Err(Error::Integration(format!("rk4_linear: non-finite state at t={t}")));
            }
        }
        sol.push(target, &y);
    }

    Ok(sol)
}

#[inline]
fn axpy_into(y: &[f64], a: f64, x: &[f64], out: &mut [f64]) {
    for ((o, &yi), &xi) in out.iter_mut().zip(y).zip(x) {
        *o = yi + a * xi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ode_adaptive::{OdeOptions, rk45_at};
    use sprs::TriMat;

    fn two_state_chain(k: f64) -> CsMat<f64> {
        // 0 -> 1 at rate k; column sums are zero.
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, -k);
        tri.add_triplet(1, 0, k);
        tri.to_csr()
    }

    #[test]
    fn spmv_csr_and_csc_agree() {
        let m = two_state_chain(2.0);
        let x = [3.0, 5.0];
        let mut a = [0.0; 2];
        let mut b = [0.0; 2];
        spmv(&m, &x, &mut a);
        spmv(&m.to_csc(), &x, &mut b);
        assert_eq!(a, [-6.0, 6.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn rk4_linear_exp_decay_matches_analytic() {
        let k = 1.3_f64;
        let m = two_state_chain(k);
        let sol = rk4_linear(&m, &[2.0, 0.0], 0.0, &[0.25, 1.0], 1e-2, 1_000_000).unwrap();
        let y1 = &sol.y[1];
        let expected = 2.0 * (-k).exp();
        // RK4 global error is O(dt^4).
        assert!((y1[0] - expected).abs() < 1e-9, "y1={} expected={expected}", y1[0]);
        assert!((y1[0] + y1[1] - 2.0).abs() < 1e-12, "mass must be conserved");
        assert_eq!(sol.t, vec![0.25, 1.0]);
    }

    #[test]
    fn rk4_and_rk45_agree() {
        let m = two_state_chain(0.8);
        let t_eval = [0.5, 1.5, 4.0];
        let fixed = rk4_linear(&m, &[1.0, 0.0], 0.0, &t_eval, 1e-3, 1_000_000).unwrap();
        let sys = LinearSparseOde::new(m).unwrap();
        let opts = OdeOptions { rtol: 1e-10, atol: 1e-12, ..OdeOptions::default() };
        let adaptive = rk45_at(&sys, &[1.0, 0.0], 0.0, &t_eval, &opts).unwrap();
        for (a, b) in fixed.y.iter().zip(&adaptive.y) {
            assert!((a[0] - b[0]).abs() < 1e-9 && (a[1] - b[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn rk4_linear_validates_inputs() {
        let m = two_state_chain(1.0);
        assert!(rk4_linear(&m, &[1.0], 0.0, &[1.0], 0.1, 10).is_err());
        assert!(rk4_linear(&m, &[1.0, 0.0], 0.0, &[1.0], 0.0, 10).is_err());
        assert!(rk4_linear(&m, &[1.0, 0.0], 1.0, &[0.5], 0.1, 10).is_err());
        let err = rk4_linear(&m, &[1.0, 0.0], 0.0, &[100.0], 0.1, 10).unwrap_err();
        assert!(matches!(err, Error::Integration(_)));
    }

    #[test]
    fn linear_sparse_ode_rejects_rectangular() {
        let tri: TriMat<f64> = TriMat::new((2, 3));
        assert!(LinearSparseOde::new(tri.to_csr()).is_err());
    }
}
