//! Optimization variable blocks.
//!
//! The OPF vector `x` is the concatenation of named blocks in a fixed order:
//!
//! ```text
//! x = [ Va | Vm | Pg | Qg | y ]      (AC)
//! x = [ Va | Pg | y ]                (DC)
//! ```
//!
//! Every constraint matrix in the model has exactly `VariableSet::len()`
//! columns laid out in this order.

use std::fmt;
use std::ops::Range;

use serde::Serialize;

/// Proxy magnitude for infinite bounds when picking a starting point
const INFINITE_BOUND: f64 = 1e10;

/// Name of a variable block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VarKind {
    /// Bus voltage angles (rad)
    Va,
    /// Bus voltage magnitudes (p.u.)
    Vm,
    /// Unit active output (p.u.)
    Pg,
    /// Unit reactive output (p.u.)
    Qg,
    /// Piecewise-linear cost helpers ($/h)
    Y,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarKind::Va => "Va",
            VarKind::Vm => "Vm",
            VarKind::Pg => "Pg",
            VarKind::Qg => "Qg",
            VarKind::Y => "y",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableBlock {
    pub kind: VarKind,
    pub offset: usize,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl VariableBlock {
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Ordered set of variable blocks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSet {
    blocks: Vec<VariableBlock>,
    len: usize,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block. Both bound vectors must have equal length.
    pub fn add(&mut self, kind: VarKind, lower: Vec<f64>, upper: Vec<f64>) {
        debug_assert_eq!(lower.len(), upper.len());
        let offset = self.len;
        self.len += lower.len();
        self.blocks.push(VariableBlock {
            kind,
            offset,
            lower,
            upper,
        });
    }

    /// Total number of variables
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn blocks(&self) -> &[VariableBlock] {
        &self.blocks
    }

    pub fn block(&self, kind: VarKind) -> Option<&VariableBlock> {
        self.blocks.iter().find(|b| b.kind == kind)
    }

    /// Column range of a block; empty when the block is absent.
    pub fn range(&self, kind: VarKind) -> Range<usize> {
        self.block(kind).map(|b| b.range()).unwrap_or(0..0)
    }

    /// First column of a block; absent blocks report the end of `x`.
    pub fn offset(&self, kind: VarKind) -> usize {
        self.block(kind).map(|b| b.offset).unwrap_or(self.len)
    }

    pub fn count(&self, kind: VarKind) -> usize {
        self.block(kind).map(|b| b.len()).unwrap_or(0)
    }

    /// Strictly interior point of the bounds.
    ///
    /// Finite boxes start at their midpoint; a single finite side starts
    /// one unit inside it; free variables start at zero.
    pub fn initial(&self) -> Vec<f64> {
        self.lower()
            .into_iter()
            .zip(self.upper())
            .map(|(lo, hi)| {
                let lo_finite = lo > -INFINITE_BOUND;
                let hi_finite = hi < INFINITE_BOUND;
                match (lo_finite, hi_finite) {
                    (true, false) => lo + 1.0,
                    (false, true) => hi - 1.0,
                    _ => (lo.max(-INFINITE_BOUND) + hi.min(INFINITE_BOUND)) / 2.0,
                }
            })
            .collect()
    }

    pub fn lower(&self) -> Vec<f64> {
        self.blocks.iter().flat_map(|b| b.lower.iter().copied()).collect()
    }

    pub fn upper(&self) -> Vec<f64> {
        self.blocks.iter().flat_map(|b| b.upper.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_concatenated_in_order() {
        let mut vars = VariableSet::new();
        vars.add(VarKind::Va, vec![-1.0; 3], vec![1.0; 3]);
        vars.add(VarKind::Pg, vec![0.0; 2], vec![1.0; 2]);
        vars.add(VarKind::Y, vec![], vec![]);

        assert_eq!(vars.len(), 5);
        assert_eq!(vars.range(VarKind::Pg), 3..5);
        assert_eq!(vars.offset(VarKind::Y), 5);
        assert_eq!(vars.count(VarKind::Vm), 0);
        assert_eq!(vars.range(VarKind::Vm), 0..0);
        assert_eq!(vars.lower(), vec![-1.0, -1.0, -1.0, 0.0, 0.0]);
        assert_eq!(VarKind::Y.to_string(), "y");
    }

    #[test]
    fn test_initial_point_is_strictly_interior() {
        let inf = f64::INFINITY;
        let mut vars = VariableSet::new();
        vars.add(VarKind::Pg, vec![0.2, -inf, 1.0, -inf], vec![0.6, 3.0, inf, inf]);
        vars.add(VarKind::Y, vec![0.5], vec![0.5]);

        assert_eq!(vars.initial(), vec![0.4, 2.0, 2.0, 0.0, 0.5]);
    }
}
