//! # fsp-core
//!
//! Foundational types shared by the finite state projection crates:
//! - [`Crn`]: immutable description of a chemical reaction network
//! - [`Propensity`]: the `(parameters, state) -> rate` contract
//! - [`Error`] / [`Result`]: the error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error taxonomy.
pub mod error;
/// Propensity contract and the mass-action implementation.
pub mod traits;
/// CRN description.
pub mod types;

pub use error::{Error, Result};
pub use traits::{MassAction, Propensity};
pub use types::{Crn, State};

/// Workspace version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
