//! Numerical integration of differential quantities.
//!
//! Reactive behaviors turn `dq/dt` into a companion model (a conductance in
//! parallel with a current source) using the coefficients of an
//! [`IntegrationMethod`]. The method also estimates the local truncation
//! error of each solved timepoint and proposes the next step.

mod history;
mod method;

pub use history::History;
pub use method::{
    IntegrationMethod, MethodKind, StateDerivative, StateHistory, StepVerdict, MAX_GEAR_ORDER,
};
