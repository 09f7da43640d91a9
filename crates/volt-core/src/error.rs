//! Unified error types for the volt workspace
//!
//! Every fallible operation in the power-flow and OPF pipeline reports one
//! of the kinds below. Topology and bounds problems are detected while
//! building a problem and abort it before anything is solved; numeric
//! problems come out of factorization or the interior-point iterations.
//!
//! A solve that merely runs out of iterations is *not* an error: it comes
//! back as a solution with `converged = false`.
//!
//! # Example
//!
//! ```ignore
//! use volt_core::{VoltError, VoltResult};
//!
//! fn check_reactance(x: f64) -> VoltResult<f64> {
//!     if x == 0.0 || !x.is_finite() {
//!         return Err(VoltError::Topology(format!("invalid reactance {x}")));
//!     }
//!     Ok(1.0 / x)
//! }
//! ```

use thiserror::Error;

/// Error type shared by the core model and the algorithms built on it.
#[derive(Error, Debug)]
pub enum VoltError {
    /// Missing/multiple slack buses, islands, bad branch parameters
    #[error("Topology error: {0}")]
    Topology(String),

    /// Inconsistent limits or non-convex cost curves
    #[error("Bounds error: {0}")]
    Bounds(String),

    /// Factorization failure, NaN/Inf iterates, collapsed step sizes
    #[error("Numeric error: {0}")]
    Numeric(String),

    /// Invalid options
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors when reading or writing network snapshots
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience type alias for Results using VoltError.
pub type VoltResult<T> = Result<T, VoltError>;

impl VoltError {
    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VoltError::Topology(_) => "topology",
            VoltError::Bounds(_) => "bounds",
            VoltError::Numeric(_) => "numeric",
            VoltError::Config(_) => "config",
            VoltError::Io(_) => "io",
            VoltError::Parse(_) => "parse",
        }
    }
}

impl From<serde_json::Error> for VoltError {
    fn from(err: serde_json::Error) -> Self {
        VoltError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VoltError::Topology("no slack bus".into());
        assert!(err.to_string().contains("Topology error"));
        assert!(err.to_string().contains("no slack bus"));
        assert_eq!(err.kind(), "topology");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VoltError = io_err.into();
        assert!(matches!(err, VoltError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<f64>>("[1.0,").unwrap_err();
        let err: VoltError = json_err.into();
        assert!(matches!(err, VoltError::Parse(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> VoltResult<()> {
            Err(VoltError::Bounds("Pmin > Pmax".into()))
        }

        fn outer() -> VoltResult<()> {
            inner()?;
            Ok(())
        }

        assert!(matches!(outer(), Err(VoltError::Bounds(_))));
    }
}
