//! Adaptive explicit Runge–Kutta integration.
//!
//! Dormand–Prince 5(4) with FSAL, local extrapolation and the standard
//! mixed absolute/relative RMS error norm. Two drivers share the stepper:
//! - [`rk45`] records every accepted step on `[t0, t1]`
//! - [`rk45_at`] lands exactly on each requested output time and records only those

use fsp_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::ode::OdeSolution;

/// Right-hand side of `dy/dt = f(t, y)`.
pub trait OdeSystem {
    /// State dimension.
    fn ndim(&self) -> usize;

    /// Evaluate `f(t, y)` into `dydt`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

/// Step-size control options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OdeOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Initial step. `None` selects one from the local derivative scale.
    pub h0: Option<f64>,
    /// Largest allowed step. `None` leaves the step unbounded.
    pub h_max: Option<f64>,
    /// Accepted + rejected step budget.
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self { rtol: 1e-3, atol: 1e-6, h0: None, h_max: None, max_steps: 1_000_000 }
    }
}

impl OdeOptions {
    /// Check tolerances and budgets.
    pub fn validate(&self) -> Result<()> {
        if !self.rtol.is_finite() || self.rtol <= 0.0 {
            return Err(Error::Validation(format!("ode: rtol must be finite and > 0, got {}", self.rtol)));
        }
        if !self.atol.is_finite() || self.atol <= 0.0 {
            return Err(Error::Validation(format!("ode: atol must be finite and > 0, got {}", self.atol)));
        }
        if let Some(h0) = self.h0 {
            if !h0.is_finite() || h0 <= 0.0 {
                return Err(Error::Validation(format!("ode: h0 must be finite and > 0, got {h0}")));
            }
        }
        if let Some(h_max) = self.h_max {
            if h_max.is_nan() || h_max <= 0.0 {
                return Err(Error::Validation(format!("ode: h_max must be > 0, got {h_max}")));
            }
        }
        if self.max_steps == 0 {
            return Err(Error::Validation("ode: max_steps must be > 0".into()));
        }
        Ok(())
    }
}

// Dormand–Prince tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// 5th-order minus embedded 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Integrate `sys` from `t0` to `t1`, recording every accepted step.
///
/// The returned solution starts at `(t0, y0)` and ends exactly at `t1`.
pub fn rk45<S: OdeSystem>(
    sys: &S,
    y0: &[f64],
    t0: f64,
    t1: f64,
    opts: &OdeOptions,
) -> Result<OdeSolution> {
    if !t1.is_finite() {
        return Err(Error::Validation("rk45: t1 must be finite".into()));
    }
    integrate(sys, y0, t0, &[t1], true, opts)
}

/// Integrate `sys` from `t0` and report the state at each time in `t_eval`.
///
/// `t_eval` must be non-decreasing and not earlier than `t0`. The integrator
/// shortens steps to land exactly on every output time.
pub fn rk45_at<S: OdeSystem>(
    sys: &S,
    y0: &[f64],
    t0: f64,
    t_eval: &[f64],
    opts: &OdeOptions,
) -> Result<OdeSolution> {
    if t_eval.is_empty() {
        return Ok(OdeSolution { t: Vec::new(), y: Vec::new() });
    }
    if t_eval.iter().any(|t| !t.is_finite()) {
        return Err(Error::Validation("rk45_at: t_eval must be finite".into()));
    }
    if t_eval.windows(2).any(|w| w[1] < w[0]) {
        return Err(Error::Validation("rk45_at: t_eval must be non-decreasing".into()));
    }
    integrate(sys, y0, t0, t_eval, false, opts)
}

fn integrate<S: OdeSystem>(
    sys: &S,
    y0: &[f64],
    t0: f64,
    stops: &[f64],
    record_steps: bool,
    opts: &OdeOptions,
) -> Result<OdeSolution> {
    opts.validate()?;
    let n = sys.ndim();
    if y0.len() != n {
        return Err(Error::Validation(format!("rk45: len(y0)={} != ndim={n}", y0.len())));
    }
    if !t0.is_finite() {
        return Err(Error::Validation("rk45: t0 must be finite".into()));
    }
    if y0.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("rk45: y0 must be finite".into()));
    }
    if stops[0] < t0 {
        return Err(Error::Validation(format!(
            "rk45: output time {} precedes t0={t0} (integration is forward only)",
            stops[0]
        )));
    }

    let mut sol = OdeSolution { t: Vec::new(), y: Vec::new() };
    let mut t = t0;
    let mut y = y0.to_vec();
    if record_steps {
        sol.push(t, &y);
    }

    let mut stage = Stages::new(n);
    sys.rhs(t, &y, &mut stage.k1);

    let t_end = stops[stops.len() - 1];
    let h_max = opts.h_max.unwrap_or(f64::INFINITY);
    let mut h = match opts.h0 {
        Some(h0) => h0,
        None => initial_step(sys, t, &y, &stage.k1, t_end - t0, opts),
    }
    .min(h_max);

    let mut y_new = vec![0.0; n];
    let mut err = vec![0.0; n];
    let mut next_stop = 0usize;
    let mut n_steps = 0usize;
    let mut n_rejected = 0usize;

    loop {
        // Record every output time already reached.
        while next_stop < stops.len() && stops[next_stop] <= t {
            if !record_steps {
                sol.push(stops[next_stop], &y);
            }
            next_stop += 1;
        }
        if next_stop == stops.len() {
            break;
        }

        if n_steps >= opts.max_steps {
            return Err(Error::Integration(format!(
                "rk45: exceeded max_steps={} at t={t} before reaching t={t_end}",
                opts.max_steps
            )));
        }
        n_steps += 1;

        let target = stops[next_stop];
        let min_step = 10.0 * f64::EPSILON * t.abs().max(1.0);
        let landing = h >= target - t;
        let h_try = if landing { target - t } else { h };
        if h_try < min_step && !landing {
            return Err(Error::Integration(format!("rk45: step size underflow at t={t} (h={h_try:e})")));
        }

        stage.step(sys, t, &y, h_try, &mut y_new, &mut err);
        // A non-finite trial state is rejected like any oversized step.
        let err_norm = if y_new.iter().all(|v| v.is_finite()) {
            error_norm(&err, &y, &y_new, opts)
        } else {
            f64::INFINITY
        };
        if err_norm <= 1.0 {
            t = if landing { target } else { t + h_try };
            std::mem::swap(&mut y, &mut y_new);
            // FSAL: k7 evaluated at (t + h, y_new) is the next k1.
            std::mem::swap(&mut stage.k1, &mut stage.k7);
            if record_steps {
                sol.push(t, &y);
            }
            let factor = if err_norm == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };
            // A step shortened to land on an output time does not shrink the controller.
            let base = if landing { h.max(h_try) } else { h_try };
            h = (base * factor).min(h_max);
        } else {
            n_rejected += 1;
            let factor = (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, 1.0);
            h = h_try * factor;
            if h < min_step {
                return Err(Error::Integration(format!(
                    "rk45: step size underflow at t={t} (h={h:e}, err={err_norm:e})"
                )));
            }
        }
    }

    log::debug!("rk45: n={n} steps={n_steps} rejected={n_rejected} t_end={t_end}");
    Ok(sol)
}

/// Stage storage for one Dormand–Prince step.
struct Stages {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    k5: Vec<f64>,
    k6: Vec<f64>,
    k7: Vec<f64>,
    tmp: Vec<f64>,
}

impl Stages {
    fn new(n: usize) -> Self {
        Self {
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            k3: vec![0.0; n],
            k4: vec![0.0; n],
            k5: vec![0.0; n],
            k6: vec![0.0; n],
            k7: vec![0.0; n],
            tmp: vec![0.0; n],
        }
    }

    /// One trial step from `(t, y)` with size `h`; expects `k1 = f(t, y)`.
    fn step<S: OdeSystem>(
        &mut self,
        sys: &S,
        t: f64,
        y: &[f64],
        h: f64,
        y_new: &mut [f64],
        err: &mut [f64],
    ) {
        let n = y.len();

        for i in 0..n {
            self.tmp[i] = y[i] + h * A21 * self.k1[i];
        }
        sys.rhs(t + C2 * h, &self.tmp, &mut self.k2);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (A31 * self.k1[i] + A32 * self.k2[i]);
        }
        sys.rhs(t + C3 * h, &self.tmp, &mut self.k3);

        for i in 0..n {
            self.tmp[i] = y[i] + h * (A41 * self.k1[i] + A42 * self.k2[i] + A43 * self.k3[i]);
        }
        sys.rhs(t + C4 * h, &self.tmp, &mut self.k4);

        for i in 0..n {
            self.tmp[i] = y[i]
                + h * (A51 * self.k1[i] + A52 * self.k2[i] + A53 * self.k3[i] + A54 * self.k4[i]);
        }
        sys.rhs(t + C5 * h, &self.tmp, &mut self.k5);

        for i in 0..n {
            self.tmp[i] = y[i]
                + h * (A61 * self.k1[i]
                    + A62 * self.k2[i]
                    + A63 * self.k3[i]
                    + A64 * self.k4[i]
                    + A65 * self.k5[i]);
        }
        sys.rhs(t + h, &self.tmp, &mut self.k6);

        for i in 0..n {
            y_new[i] = y[i]
                + h * (A71 * self.k1[i]
                    + A73 * self.k3[i]
                    + A74 * self.k4[i]
                    + A75 * self.k5[i]
                    + A76 * self.k6[i]);
        }
        sys.rhs(t + h, y_new, &mut self.k7);

        for i in 0..n {
            err[i] = h
                * (E1 * self.k1[i]
                    + E3 * self.k3[i]
                    + E4 * self.k4[i]
                    + E5 * self.k5[i]
                    + E6 * self.k6[i]
                    + E7 * self.k7[i]);
        }
    }
}

fn error_norm(err: &[f64], y: &[f64], y_new: &[f64], opts: &OdeOptions) -> f64 {
    if err.is_empty() {
        return 0.0;
    }
    let sum: f64 = err
        .iter()
        .zip(y.iter().zip(y_new))
        .map(|(&e, (&a, &b))| {
            let scale = opts.atol + opts.rtol * a.abs().max(b.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / err.len() as f64).sqrt()
}

fn rms_scaled(v: &[f64], y: &[f64], opts: &OdeOptions) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v
        .iter()
        .zip(y)
        .map(|(&vi, &yi)| (vi / (opts.atol + opts.rtol * yi.abs())).powi(2))
        .sum();
    (sum / v.len() as f64).sqrt()
}

/// Initial step from the scale of `y0`, `f(t0, y0)` and a second-derivative estimate
/// (Hairer, Nørsett & Wanner, Solving ODEs I, §II.4).
fn initial_step<S: OdeSystem>(
    sys: &S,
    t0: f64,
    y0: &[f64],
    f0: &[f64],
    span: f64,
    opts: &OdeOptions,
) -> f64 {
    if span <= 0.0 {
        return 1.0;
    }
    let d0 = rms_scaled(y0, y0, opts);
    let d1 = rms_scaled(f0, y0, opts);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    let h0 = h0.min(span);

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(&y, &f)| y + h0 * f).collect();
    let mut f1 = vec![0.0; y0.len()];
    sys.rhs(t0 + h0, &y1, &mut f1);
    let df: Vec<f64> = f1.iter().zip(f0).map(|(&a, &b)| a - b).collect();
    let d2 = rms_scaled(&df, y0, opts) / h0;

    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(0.2)
    };
    (100.0 * h0).min(h1).min(span)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decay {
        k: f64,
    }

    impl OdeSystem for Decay {
        fn ndim(&self) -> usize {
            1
        }
        fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = -self.k * y[0];
        }
    }

    /// Harmonic oscillator y'' = -y.
    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn ndim(&self) -> usize {
            2
        }
        fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
            dydt[0] = y[1];
            dydt[1] = -y[0];
        }
    }

    fn tight() -> OdeOptions {
        OdeOptions { rtol: 1e-10, atol: 1e-12, ..OdeOptions::default() }
    }

    #[test]
    fn rk45_exp_decay_matches_analytic() {
        let sys = Decay { k: 1.3 };
        let sol = rk45(&sys, &[2.0], 0.0, 1.0, &tight()).unwrap();
        let y1 = sol.y.last().unwrap()[0];
        let expected = 2.0 * (-1.3_f64).exp();
        assert!((y1 - expected).abs() < 1e-9, "y1={y1} expected={expected}");
        assert_eq!(sol.t.first().copied().unwrap(), 0.0);
        assert_eq!(sol.t.last().copied().unwrap(), 1.0);
    }

    #[test]
    fn rk45_at_lands_on_output_times() {
        let t_eval = [0.0, 0.5, 0.5, 1.0, 3.0, 6.0];
        let sol = rk45_at(&Oscillator, &[1.0, 0.0], 0.0, &t_eval, &tight()).unwrap();
        assert_eq!(sol.t, t_eval.to_vec());
        for (t, y) in sol.t.iter().zip(&sol.y) {
            assert!((y[0] - t.cos()).abs() < 1e-8, "t={t}: {} vs {}", y[0], t.cos());
            assert!((y[1] + t.sin()).abs() < 1e-8, "t={t}: {} vs {}", y[1], -t.sin());
        }
    }

    #[test]
    fn rk45_at_default_tolerances_are_reasonable() {
        let sys = Decay { k: 0.7 };
        let sol = rk45_at(&sys, &[1.0], 0.0, &[1.0, 2.0], &OdeOptions::default()).unwrap();
        assert!((sol.y[1][0] - (-1.4_f64).exp()).abs() < 1e-3);
    }

    #[test]
    fn rk45_at_rejects_bad_grids() {
        let sys = Decay { k: 1.0 };
        let opts = OdeOptions::default();
        assert!(matches!(rk45_at(&sys, &[1.0], 0.0, &[1.0, 0.5], &opts), Err(Error::Validation(_))));
        assert!(matches!(rk45_at(&sys, &[1.0], 1.0, &[0.5], &opts), Err(Error::Validation(_))));
        assert!(matches!(rk45_at(&sys, &[1.0, 2.0], 0.0, &[1.0], &opts), Err(Error::Validation(_))));
        assert!(rk45_at(&sys, &[1.0], 0.0, &[], &opts).unwrap().t.is_empty());
    }

    #[test]
    fn rk45_reports_step_budget_exhaustion() {
        let sys = Decay { k: 1.0 };
        let opts = OdeOptions { max_steps: 3, h0: Some(1e-3), h_max: Some(1e-3), ..OdeOptions::default() };
        let err = rk45(&sys, &[1.0], 0.0, 10.0, &opts).unwrap_err();
        assert!(matches!(err, Error::Integration(_)), "{err}");
    }

    #[test]
    fn rk45_reports_blow_up() {
        struct Blowup;
        impl OdeSystem for Blowup {
            fn ndim(&self) -> usize {
                1
            }
            fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
                dydt[0] = y[0] * y[0];
            }
        }
        // y' = y^2, y(0) = 1 explodes at t = 1.
        let err = rk45(&Blowup, &[1.0], 0.0, 2.0, &OdeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Integration(_)), "{err}");
    }

    #[test]
    fn options_validate() {
        assert!(OdeOptions::default().validate().is_ok());
        assert!(OdeOptions { rtol: 0.0, ..OdeOptions::default() }.validate().is_err());
        assert!(OdeOptions { atol: f64::NAN, ..OdeOptions::default() }.validate().is_err());
        assert!(OdeOptions { h0: Some(-1.0), ..OdeOptions::default() }.validate().is_err());
        assert!(OdeOptions { max_steps: 0, ..OdeOptions::default() }.validate().is_err());
    }
}
