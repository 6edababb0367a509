//! Independent voltage and current sources.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::behaviors::{
    connect_pins, BranchStamp, CurrentStamp, Device, FrequencyContext, FrequencyLoadable,
    Loadable,
};
use crate::circuit::{UnknownId, UnknownKind, UnknownRegistry};
use crate::error::Result;
use crate::simulation::SimulationState;
use crate::solver::Solver;

const TWO_PINS: &[&str] = &["pos", "neg"];

/// Time-dependent value of an independent source.
#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    /// Constant value
    Dc(f64),
    /// Trapezoidal pulse train
    Pulse {
        initial: f64,
        pulsed: f64,
        delay: f64,
        rise: f64,
        fall: f64,
        width: f64,
        /// Repetition period; 0 for a single pulse
        period: f64,
    },
    /// Damped sine
    Sine {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        delay: f64,
        damping: f64,
    },
}

impl Waveform {
    /// Value at `time`.
    pub fn value(&self, time: f64) -> f64 {
        match *self {
            Waveform::Dc(value) => value,
            Waveform::Pulse {
                initial,
                pulsed,
                delay,
                rise,
                fall,
                width,
                period,
            } => {
                if time < delay {
                    return initial;
                }
                let mut t = time - delay;
                if period > 0.0 {
                    t %= period;
                }
                if t < rise {
                    initial + (pulsed - initial) * t / rise
                } else if t <= rise + width {
                    pulsed
                } else if t < rise + width + fall {
                    pulsed + (initial - pulsed) * (t - rise - width) / fall
                } else {
                    initial
                }
            }
            Waveform::Sine {
                offset,
                amplitude,
                frequency,
                delay,
                damping,
            } => {
                if time < delay {
                    return offset;
                }
                let t = time - delay;
                offset + amplitude * (-damping * t).exp() * (2.0 * PI * frequency * t).sin()
            }
        }
    }
}

impl From<f64> for Waveform {
    fn from(value: f64) -> Self {
        Waveform::Dc(value)
    }
}

/// An independent voltage source.
///
/// Adds a branch current unknown `<name>#branch` and enforces
///   V(pos) - V(neg) = value
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub nodes: [UnknownId; 2],
    pub waveform: Waveform,
    /// Small-signal magnitude
    pub ac_magnitude: f64,
    /// Small-signal phase (degrees)
    pub ac_phase: f64,
    pub branch: UnknownId,
    stamp: BranchStamp,
    ac_stamp: BranchStamp,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(name: impl Into<String>, waveform: impl Into<Waveform>) -> Self {
        Self {
            name: name.into(),
            nodes: [UnknownId::GROUND; 2],
            waveform: waveform.into(),
            ac_magnitude: 0.0,
            ac_phase: 0.0,
            branch: UnknownId::GROUND,
            stamp: BranchStamp::default(),
            ac_stamp: BranchStamp::default(),
        }
    }

    /// Set the small-signal excitation.
    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.ac_magnitude = magnitude;
        self.ac_phase = phase;
        self
    }

    /// Source voltage at `time`.
    pub fn voltage(&self, time: f64) -> f64 {
        self.waveform.value(time)
    }
}

impl Loadable for VoltageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        TWO_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        vec![self.nodes[0], self.nodes[1], self.branch]
    }

    fn setup(&mut self, unknowns: &mut UnknownRegistry) -> Result<()> {
        self.branch = unknowns.create(&format!("{}#branch", self.name), UnknownKind::Current)?;
        Ok(())
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        let [pos, neg] = self.nodes;
        self.stamp = BranchStamp::bind(solver, pos, neg, self.branch, false)?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
        self.stamp.stamp_incidence(solver);
        let value = self.voltage(state.time) * state.source_factor;
        self.stamp.stamp_rhs(solver, value);
        Ok(())
    }
}

impl FrequencyLoadable for VoltageSource {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        let [pos, neg] = self.nodes;
        self.ac_stamp = BranchStamp::bind(solver, pos, neg, self.branch, false)?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        _context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_stamp.stamp_incidence(solver);
        let phasor = Complex64::from_polar(self.ac_magnitude, self.ac_phase.to_radians());
        self.ac_stamp.stamp_rhs(solver, phasor);
        Ok(())
    }
}

impl Device for VoltageSource {
    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}

/// An independent current source.
///
/// Current flows from pos through the source to neg.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub nodes: [UnknownId; 2],
    pub waveform: Waveform,
    pub ac_magnitude: f64,
    pub ac_phase: f64,
    stamp: CurrentStamp,
    ac_stamp: CurrentStamp,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(name: impl Into<String>, waveform: impl Into<Waveform>) -> Self {
        Self {
            name: name.into(),
            nodes: [UnknownId::GROUND; 2],
            waveform: waveform.into(),
            ac_magnitude: 0.0,
            ac_phase: 0.0,
            stamp: CurrentStamp::default(),
            ac_stamp: CurrentStamp::default(),
        }
    }

    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.ac_magnitude = magnitude;
        self.ac_phase = phase;
        self
    }

    /// Source current at `time`.
    pub fn current(&self, time: f64) -> f64 {
        self.waveform.value(time)
    }
}

impl Loadable for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        TWO_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        self.nodes.to_vec()
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        self.stamp = CurrentStamp::bind(solver, self.nodes[0], self.nodes[1])?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
        let value = self.current(state.time) * state.source_factor;
        self.stamp.stamp(solver, value);
        Ok(())
    }
}

impl FrequencyLoadable for CurrentSource {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        self.ac_stamp = CurrentStamp::bind(solver, self.nodes[0], self.nodes[1])?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        _context: &FrequencyContext<'_>,
    ) -> Result<()> {
        let phasor = Complex64::from_polar(self.ac_magnitude, self.ac_phase.to_radians());
        self.ac_stamp.stamp(solver, phasor);
        Ok(())
    }
}

impl Device for CurrentSource {
    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}
