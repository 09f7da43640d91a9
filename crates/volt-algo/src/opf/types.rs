use std::fmt;

use serde::{Deserialize, Serialize};
use volt_core::VoltError;

/// OPF formulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpfMethod {
    /// Linearized network, quadratic program in (Va, Pg, y)
    #[default]
    Dc,
    /// Full polar AC network, nonlinear program in (Va, Vm, Pg, Qg, y)
    Ac,
}

impl OpfMethod {
    pub fn is_ac(self) -> bool {
        self == OpfMethod::Ac
    }
}

impl fmt::Display for OpfMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpfMethod::Dc => write!(f, "dc"),
            OpfMethod::Ac => write!(f, "ac"),
        }
    }
}

impl std::str::FromStr for OpfMethod {
    type Err = VoltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dc" | "dcopf" => Ok(OpfMethod::Dc),
            "ac" | "acopf" => Ok(OpfMethod::Ac),
            _ => Err(VoltError::Config(format!("Unknown OPF method: {}", s))),
        }
    }
}

/// Lagrange multipliers at the solution, in solver units ($/h per p.u.).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Multipliers {
    /// Lower side of each linear row `l ≤ A·x`
    pub mu_l: Vec<f64>,
    /// Upper side of each linear row `A·x ≤ u`
    pub mu_u: Vec<f64>,
    /// Variable lower bounds
    pub lower: Vec<f64>,
    /// Variable upper bounds
    pub upper: Vec<f64>,
    /// Nonlinear equalities (AC `Pmis`, `Qmis`)
    pub eq_nonlin: Vec<f64>,
    /// Nonlinear inequalities (AC `Sf`, `St`)
    pub ineq_nonlin: Vec<f64>,
}

/// OPF solution output
#[derive(Debug, Clone, Serialize)]
pub struct OpfSolution {
    // === Status ===
    pub converged: bool,
    pub method: OpfMethod,
    pub iterations: usize,
    pub solve_time_ms: u128,

    // === Objective ===
    /// Total cost ($/h)
    pub objective: f64,

    // === Primal / dual ===
    pub x: Vec<f64>,
    pub multipliers: Multipliers,
}

impl Default for OpfSolution {
    fn default() -> Self {
        Self {
            converged: false,
            method: OpfMethod::default(),
            iterations: 0,
            solve_time_ms: 0,
            objective: 0.0,
            x: Vec::new(),
            multipliers: Multipliers::default(),
        }
    }
}
