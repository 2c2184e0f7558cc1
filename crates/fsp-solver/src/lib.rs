//! # fsp-solver
//!
//! Finite state projection (FSP) for chemical reaction networks.
//!
//! This crate provides:
//! - State-space enumeration via the Cantor pairing function
//! - Sparse CME generators and the block-augmented sensitivity system
//! - Adaptive Dormand–Prince and fixed-step RK4 integrators
//! - Joint/marginal probabilities with parameter sensitivities
//!
//! ## Example
//!
//! ```
//! use fsp_solver::{FspSolver, networks};
//!
//! let fsp = FspSolver::with_cr(networks::birth_death(), 20).unwrap();
//! let init = fsp.point_mass_initial_state(&[0]).unwrap();
//! let m = fsp.marginal(0, &init, &[1.0, 2.0], &[3.0, 1.0], 0.0).unwrap();
//! assert_eq!(m.probabilities.shape(), (2, 21));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Solver configuration.
pub mod config;
/// Pairing function and the truncated state-space bijection.
pub mod enumeration;
/// Sparse rate matrices and the CME generator.
pub mod generator;
/// Joint and marginal trajectories.
pub mod marginal;
/// Reference reaction networks.
pub mod networks;
/// Linear sparse ODEs and fixed-step RK4.
pub mod ode;
/// Adaptive Dormand–Prince RK45.
pub mod ode_adaptive;
/// Forward sensitivity solver.
pub mod sensitivity;

pub use config::{OdeMethod, SolverConfig};
pub use enumeration::{StateSpaceEnumeration, phi, phi_inverse};
pub use marginal::{MarginalDistribution, SensitivityTrajectory};
pub use ode::{LinearSparseOde, OdeSolution};
pub use ode_adaptive::{OdeOptions, OdeSystem, rk45, rk45_at};
pub use sensitivity::FspSolver;
