use super::backend::{FaerSolver, GaussSolver, SparseSolver};
use crate::{VoltError, VoltResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Simple registry of available linear solvers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SparseSolverKind {
    Gauss,
    #[default]
    Faer,
}

impl FromStr for SparseSolverKind {
    type Err = VoltError;

    fn from_str(input: &str) -> VoltResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "gauss" => Ok(SparseSolverKind::Gauss),
            "faer" | "default" => Ok(SparseSolverKind::Faer),
            other => Err(VoltError::Config(format!(
                "unknown solver '{}'; supported values: {}",
                other,
                Self::available().join(", ")
            ))),
        }
    }
}

impl std::fmt::Display for SparseSolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SparseSolverKind {
    pub fn build_solver(self) -> Arc<dyn SparseSolver> {
        match self {
            SparseSolverKind::Gauss => Arc::new(GaussSolver),
            SparseSolverKind::Faer => Arc::new(FaerSolver),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["gauss", "faer"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SparseSolverKind::Gauss => "gauss",
            SparseSolverKind::Faer => "faer",
        }
    }
}
