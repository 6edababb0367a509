//! Reusable MNA stamp patterns.
//!
//! Each stamp requests its matrix and right-hand side handles once when
//! bound and accumulates into them on every load. Ground connections land
//! in the solver's trash slot, so no stamp branches on ground.

use crate::circuit::UnknownId;
use crate::error::Result;
use crate::solver::Solver;
use crate::sparse::{ElementId, Scalar, VectorId};

/// Conductance between two unknowns.
///
/// ```text
///        pos   neg
/// pos [  +g    -g ]
/// neg [  -g    +g ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConductanceStamp {
    pos_pos: ElementId,
    pos_neg: ElementId,
    neg_pos: ElementId,
    neg_neg: ElementId,
}

impl Default for ConductanceStamp {
    fn default() -> Self {
        Self {
            pos_pos: ElementId::TRASH,
            pos_neg: ElementId::TRASH,
            neg_pos: ElementId::TRASH,
            neg_neg: ElementId::TRASH,
        }
    }
}

impl ConductanceStamp {
    pub fn bind<T: Scalar>(solver: &mut Solver<T>, pos: UnknownId, neg: UnknownId) -> Result<Self> {
        let (p, n) = (pos.index(), neg.index());
        Ok(Self {
            pos_pos: solver.get_matrix_element(p, p)?,
            pos_neg: solver.get_matrix_element(p, n)?,
            neg_pos: solver.get_matrix_element(n, p)?,
            neg_neg: solver.get_matrix_element(n, n)?,
        })
    }

    pub fn stamp<T: Scalar>(&self, solver: &mut Solver<T>, g: T) {
        solver[self.pos_pos] += g;
        solver[self.pos_neg] -= g;
        solver[self.neg_pos] -= g;
        solver[self.neg_neg] += g;
    }
}

/// Current flowing from `pos` to `neg` through the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentStamp {
    pos: VectorId,
    neg: VectorId,
}

impl Default for CurrentStamp {
    fn default() -> Self {
        Self {
            pos: VectorId::TRASH,
            neg: VectorId::TRASH,
        }
    }
}

impl CurrentStamp {
    pub fn bind<T: Scalar>(solver: &mut Solver<T>, pos: UnknownId, neg: UnknownId) -> Result<Self> {
        Ok(Self {
            pos: solver.get_rhs_element(pos.index())?,
            neg: solver.get_rhs_element(neg.index())?,
        })
    }

    /// Current leaves `pos` and enters `neg`.
    pub fn stamp<T: Scalar>(&self, solver: &mut Solver<T>, current: T) {
        solver[self.pos] -= current;
        solver[self.neg] += current;
    }
}

/// Branch current unknown tied to two nodes, as used by voltage sources
/// and inductors.
///
/// ```text
///        pos   neg   br
/// pos [              +1 ]
/// neg [              -1 ]
/// br  [  +1    -1    -z ]   = e
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchStamp {
    pos_br: ElementId,
    neg_br: ElementId,
    br_pos: ElementId,
    br_neg: ElementId,
    br_br: Option<ElementId>,
    rhs: VectorId,
}

impl Default for BranchStamp {
    fn default() -> Self {
        Self {
            pos_br: ElementId::TRASH,
            neg_br: ElementId::TRASH,
            br_pos: ElementId::TRASH,
            br_neg: ElementId::TRASH,
            br_br: None,
            rhs: VectorId::TRASH,
        }
    }
}

impl BranchStamp {
    /// Bind the incidence entries. `with_impedance` also requests the
    /// branch diagonal for a series impedance term.
    pub fn bind<T: Scalar>(
        solver: &mut Solver<T>,
        pos: UnknownId,
        neg: UnknownId,
        branch: UnknownId,
        with_impedance: bool,
    ) -> Result<Self> {
        let (p, n, b) = (pos.index(), neg.index(), branch.index());
        let br_br = if with_impedance {
            Some(solver.get_matrix_element(b, b)?)
        } else {
            None
        };
        Ok(Self {
            pos_br: solver.get_matrix_element(p, b)?,
            neg_br: solver.get_matrix_element(n, b)?,
            br_pos: solver.get_matrix_element(b, p)?,
            br_neg: solver.get_matrix_element(b, n)?,
            br_br,
            rhs: solver.get_rhs_element(b)?,
        })
    }

    /// Stamp the ±1 incidence entries.
    pub fn stamp_incidence<T: Scalar>(&self, solver: &mut Solver<T>) {
        let one = T::one();
        solver[self.pos_br] += one;
        solver[self.neg_br] -= one;
        solver[self.br_pos] += one;
        solver[self.br_neg] -= one;
    }

    /// Subtract a series impedance `z` from the branch equation.
    pub fn stamp_impedance<T: Scalar>(&self, solver: &mut Solver<T>, z: T) {
        if let Some(id) = self.br_br {
            solver[id] -= z;
        }
    }

    /// Add `value` to the branch equation's right-hand side.
    pub fn stamp_rhs<T: Scalar>(&self, solver: &mut Solver<T>, value: T) {
        solver[self.rhs] += value;
    }
}

/// Current from `out_pos` to `out_neg` through the element, controlled by
/// the voltage between `ctrl_pos` and `ctrl_neg`.
///
/// ```text
///            ctrl_pos  ctrl_neg
/// out_pos [    +gm       -gm   ]
/// out_neg [    -gm       +gm   ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransconductanceStamp {
    pos_cpos: ElementId,
    pos_cneg: ElementId,
    neg_cpos: ElementId,
    neg_cneg: ElementId,
}

impl Default for TransconductanceStamp {
    fn default() -> Self {
        Self {
            pos_cpos: ElementId::TRASH,
            pos_cneg: ElementId::TRASH,
            neg_cpos: ElementId::TRASH,
            neg_cneg: ElementId::TRASH,
        }
    }
}

impl TransconductanceStamp {
    pub fn bind<T: Scalar>(
        solver: &mut Solver<T>,
        out_pos: UnknownId,
        out_neg: UnknownId,
        ctrl_pos: UnknownId,
        ctrl_neg: UnknownId,
    ) -> Result<Self> {
        let (op, on) = (out_pos.index(), out_neg.index());
        let (cp, cn) = (ctrl_pos.index(), ctrl_neg.index());
        Ok(Self {
            pos_cpos: solver.get_matrix_element(op, cp)?,
            pos_cneg: solver.get_matrix_element(op, cn)?,
            neg_cpos: solver.get_matrix_element(on, cp)?,
            neg_cneg: solver.get_matrix_element(on, cn)?,
        })
    }

    pub fn stamp<T: Scalar>(&self, solver: &mut Solver<T>, gm: T) {
        solver[self.pos_cpos] += gm;
        solver[self.pos_cneg] -= gm;
        solver[self.neg_cpos] -= gm;
        solver[self.neg_cneg] += gm;
    }
}
