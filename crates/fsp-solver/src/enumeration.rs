//! State-space enumeration for the truncated CME lattice.
//!
//! The projection `Φ: ℕⁿ → ℕ` generalizes the Cantor pairing
//! `Φ₂(x₀, x₁) = (x₀ + x₁)(x₀ + x₁ + 1)/2 + x₁` to `n` dimensions by folding:
//! `Φₙ(x) = Φ₂(Φₙ₋₁(x₀..xₙ₋₂), xₙ₋₁)` (Gupta et al. 2017).
//!
//! The truncated domain is `Φ⁻¹([Φ(0,…,0), Φ(0,…,0,Cr)])`. Because `Φ` is a
//! bijection, the domain maps onto a contiguous index range and can be used to
//! linearize sparse-matrix indices.

use std::collections::HashMap;

use fsp_core::{Error, Result, State};

/// Cantor pairing of two naturals. `None` on `u64` overflow.
#[inline]
fn pair(a: u64, b: u64) -> Option<u64> {
    let s = u128::from(a) + u128::from(b);
    let z = s.checked_mul(s + 1)? / 2 + u128::from(b);
    u64::try_from(z).ok()
}

/// Inverse of [`pair`].
#[inline]
fn unpair(z: u64) -> (u64, u64) {
    // v = floor((sqrt(8z + 1) - 1) / 2), the anti-diagonal holding z.
    let w = isqrt(8 * u128::from(z) + 1);
    let v = ((w - 1) / 2) as u64;
    let t = (u128::from(v) * (u128::from(v) + 1) / 2) as u64;
    let x1 = z - t;
    (v - x1, x1)
}

/// Exact integer square root (floor).
fn isqrt(n: u128) -> u128 {
    let mut r = (n as f64).sqrt() as u128;
    while r * r > n {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}

/// Projection `Φ(x)` of a lattice point onto the naturals.
///
/// The dimension is `x.len()`. Returns `None` for an empty vector or when the
/// projection does not fit in `u64`.
pub fn phi(x: &[u64]) -> Option<u64> {
    let (&first, rest) = x.split_first()?;
    rest.iter().try_fold(first, |acc, &xi| pair(acc, xi))
}

/// Inverse projection `Φ⁻¹(z)` in dimension `n`.
pub fn phi_inverse(z: u64, n: usize) -> State {
    let mut x = vec![0u64; n];
    if n == 0 {
        return x;
    }
    let mut rest = z;
    for k in (1..n).rev() {
        let (head, last) = unpair(rest);
        x[k] = last;
        rest = head;
    }
    x[0] = rest;
    x
}

/// Bijection between the truncated lattice and `0..n_states`.
///
/// Built once and immutable afterwards; safe to share across threads.
#[derive(Debug, Clone)]
pub struct StateSpaceEnumeration {
    dim: usize,
    cr: u64,
    lb: u64,
    ub: u64,
    states: Vec<State>,
    index: HashMap<State, usize>,
}

impl StateSpaceEnumeration {
    /// Enumerate the truncated domain spanned by `(0,…,0)` and `(0,…,0,cr)`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `dim == 0`
    /// - [`Error::Computation`] if the corner projection overflows or the
    ///   domain cannot be allocated
    pub fn new(cr: u64, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::Validation("enumeration: dim must be >= 1".into()));
        }
        let cl = vec![0u64; dim];
        let mut corner = vec![0u64; dim];
        corner[dim - 1] = cr;

        let lb = phi(&cl)
            .ok_or_else(|| Error::Computation("enumeration: lower corner overflows".into()))?;
        let ub = phi(&corner).ok_or_else(|| {
            Error::Computation(format!("enumeration: Cr={cr} overflows the projection"))
        })?;
        let n_states = (ub - lb)
            .checked_add(1)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                Error::Computation(format!("enumeration: Cr={cr} gives more states than fit in usize"))
            })?;

        let (states, index) = Self::create_bijection(lb, ub, dim, n_states)?;
        log::debug!("enumeration: dim={dim} cr={cr} n_states={n_states}");
        Ok(Self { dim, cr, lb, ub, states, index })
    }

    /// Record `Φ⁻¹(z)` for every `z` in `[lb, ub]`.
    fn create_bijection(
        lb: u64,
        ub: u64,
        dim: usize,
        n_states: usize,
    ) -> Result<(Vec<State>, HashMap<State, usize>)> {
        let too_large = |e: std::collections::TryReserveError| {
            Error::Computation(format!("enumeration: cannot allocate {n_states} states: {e}"))
        };
        let mut states: Vec<State> = Vec::new();
        states.try_reserve_exact(n_states).map_err(too_large)?;
        let mut index: HashMap<State, usize> = HashMap::new();
        index.try_reserve(n_states).map_err(too_large)?;
        for z in lb..=ub {
            let x = phi_inverse(z, dim);
            index.insert(x.clone(), (z - lb) as usize);
            states.push(x);
        }
        Ok((states, index))
    }

    /// Lattice dimension (number of species).
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Truncation parameter.
    pub fn cr(&self) -> u64 {
        self.cr
    }

    /// `Φ(0,…,0)`.
    pub fn lower_bound(&self) -> u64 {
        self.lb
    }

    /// `Φ(0,…,0,Cr)`.
    pub fn upper_bound(&self) -> u64 {
        self.ub
    }

    /// Number of states in the truncated domain.
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    /// Linear index of `state`, or `None` outside the truncated domain.
    pub fn index_of(&self, state: &[u64]) -> Option<usize> {
        self.index.get(state).copied()
    }

    /// State at linear `index`.
    pub fn state(&self, index: usize) -> Option<&[u64]> {
        self.states.get(index).map(Vec::as_slice)
    }

    /// All states, ordered by linear index.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Iterate `(index, state)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u64])> + '_ {
        self.states.iter().enumerate().map(|(i, s)| (i, s.as_slice()))
    }
}
