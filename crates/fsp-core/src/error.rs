//! Failure modes of enumeration, generator assembly and integration.

use thiserror::Error;

/// Every fallible operation in the FSP crates returns this.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading a network document or writing results failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed solver configuration or network JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Precondition violation (shapes, parameter vectors, propensity values, configuration)
    #[error("Validation error: {0}")]
    Validation(String),

    /// ODE integration failed to converge or produced non-finite values
    #[error("Integration error: {0}")]
    Integration(String),

    /// Pairing-function overflow or a state space too large to allocate
    #[error("Computation error: {0}")]
    Computation(String),
}

/// `Result` with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let e = Error::Validation("init_state length 3 != 8".to_string());
        assert_eq!(e.to_string(), "Validation error: init_state length 3 != 8");
        let e = Error::Integration("step size underflow".to_string());
        assert!(e.to_string().starts_with("Integration error"));
    }

    #[test]
    fn test_json_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: Error = err.into();
        assert!(matches!(e, Error::Json(_)));
    }
}
