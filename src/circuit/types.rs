//! Core types for circuit representation.

use std::fmt;

/// Index of an unknown in the MNA system.
/// Unknown 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnknownId(pub usize);

impl UnknownId {
    /// The ground reference (always index 0).
    pub const GROUND: UnknownId = UnknownId(0);

    /// Check if this is the ground reference.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }

    /// Equation/solution index of this unknown.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for UnknownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "X{}", self.0)
        }
    }
}

/// Physical quantity an unknown represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnknownKind {
    /// Node voltage
    Voltage,
    /// Branch current (voltage sources, inductors)
    Current,
}

/// A named unknown of the MNA system.
#[derive(Debug, Clone, PartialEq)]
pub struct Unknown {
    pub id: UnknownId,
    pub name: String,
    pub kind: UnknownKind,
}

impl fmt::Display for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            UnknownKind::Voltage => write!(f, "V({})", self.name),
            UnknownKind::Current => write!(f, "I({})", self.name),
        }
    }
}
