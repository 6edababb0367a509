//! Voltage-controlled sources.

use num_complex::Complex64;

use crate::behaviors::{
    connect_pins, BranchStamp, Device, FrequencyContext, FrequencyLoadable, Loadable,
    TransconductanceStamp,
};
use crate::circuit::{UnknownId, UnknownKind, UnknownRegistry};
use crate::error::Result;
use crate::simulation::SimulationState;
use crate::solver::Solver;

const FOUR_PINS: &[&str] = &["pos", "neg", "ctrl_pos", "ctrl_neg"];

/// Voltage-controlled current source.
///
/// I(pos → neg) = gm · (V(ctrl_pos) - V(ctrl_neg))
#[derive(Debug, Clone)]
pub struct Vccs {
    pub name: String,
    pub nodes: [UnknownId; 4],
    pub transconductance: f64,
    stamp: TransconductanceStamp,
    ac_stamp: TransconductanceStamp,
}

impl Vccs {
    pub fn new(name: impl Into<String>, transconductance: f64) -> Self {
        Self {
            name: name.into(),
            nodes: [UnknownId::GROUND; 4],
            transconductance,
            stamp: TransconductanceStamp::default(),
            ac_stamp: TransconductanceStamp::default(),
        }
    }
}

impl Loadable for Vccs {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        FOUR_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        self.nodes.to_vec()
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        let [pos, neg, cpos, cneg] = self.nodes;
        self.stamp = TransconductanceStamp::bind(solver, pos, neg, cpos, cneg)?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, _state: &mut SimulationState) -> Result<()> {
        self.stamp.stamp(solver, self.transconductance);
        Ok(())
    }
}

impl FrequencyLoadable for Vccs {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        let [pos, neg, cpos, cneg] = self.nodes;
        self.ac_stamp = TransconductanceStamp::bind(solver, pos, neg, cpos, cneg)?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        _context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_stamp
            .stamp(solver, Complex64::new(self.transconductance, 0.0));
        Ok(())
    }
}

impl Device for Vccs {
    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}

/// Voltage-controlled voltage source.
///
/// V(pos) - V(neg) = gain · (V(ctrl_pos) - V(ctrl_neg)), through a branch
/// current unknown `<name>#branch`.
#[derive(Debug, Clone)]
pub struct Vcvs {
    pub name: String,
    pub nodes: [UnknownId; 4],
    pub gain: f64,
    pub branch: UnknownId,
    stamp: BranchStamp,
    control: TransconductanceStamp,
    ac_stamp: BranchStamp,
    ac_control: TransconductanceStamp,
}

impl Vcvs {
    pub fn new(name: impl Into<String>, gain: f64) -> Self {
        Self {
            name: name.into(),
            nodes: [UnknownId::GROUND; 4],
            gain,
            branch: UnknownId::GROUND,
            stamp: BranchStamp::default(),
            control: TransconductanceStamp::default(),
            ac_stamp: BranchStamp::default(),
            ac_control: TransconductanceStamp::default(),
        }
    }
}

impl Loadable for Vcvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> &'static [&'static str] {
        FOUR_PINS
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins(&self.name, &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        let mut connections = self.nodes.to_vec();
        connections.push(self.branch);
        connections
    }

    fn setup(&mut self, unknowns: &mut UnknownRegistry) -> Result<()> {
        self.branch = unknowns.create(&format!("{}#branch", self.name), UnknownKind::Current)?;
        Ok(())
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        let [pos, neg, cpos, cneg] = self.nodes;
        self.stamp = BranchStamp::bind(solver, pos, neg, self.branch, false)?;
        // Branch row against the control pair; the ground side lands in trash
        self.control =
            TransconductanceStamp::bind(solver, self.branch, UnknownId::GROUND, cpos, cneg)?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, _state: &mut SimulationState) -> Result<()> {
        self.stamp.stamp_incidence(solver);
        self.control.stamp(solver, -self.gain);
        Ok(())
    }
}

impl FrequencyLoadable for Vcvs {
    fn bind_frequency(&mut self, solver: &mut Solver<Complex64>) -> Result<()> {
        let [pos, neg, cpos, cneg] = self.nodes;
        self.ac_stamp = BranchStamp::bind(solver, pos, neg, self.branch, false)?;
        self.ac_control =
            TransconductanceStamp::bind(solver, self.branch, UnknownId::GROUND, cpos, cneg)?;
        Ok(())
    }

    fn load_frequency(
        &mut self,
        solver: &mut Solver<Complex64>,
        _context: &FrequencyContext<'_>,
    ) -> Result<()> {
        self.ac_stamp.stamp_incidence(solver);
        self.ac_control.stamp(solver, Complex64::new(-self.gain, 0.0));
        Ok(())
    }
}

impl Device for Vcvs {
    fn as_frequency_loadable(&mut self) -> Option<&mut dyn FrequencyLoadable> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcvs_stamps_control_row() {
        let mut unknowns = UnknownRegistry::new();
        let out = unknowns.map_node("out").unwrap();
        let inp = unknowns.map_node("in").unwrap();
        let mut e = Vcvs::new("E1", 10.0);
        e.connect(&[out, UnknownId::GROUND, inp, UnknownId::GROUND])
            .unwrap();
        e.setup(&mut unknowns).unwrap();

        let mut solver = Solver::new();
        e.bind(&mut solver).unwrap();
        let mut state =
            SimulationState::new(unknowns.len(), &crate::simulation::BaseConfiguration::default());
        e.load(&mut solver, &mut state).unwrap();

        let b = e.branch.index();
        let control = solver.find_matrix_element(b, inp.index()).unwrap();
        assert_eq!(solver[control], -10.0);
        let incidence = solver.find_matrix_element(b, out.index()).unwrap();
        assert_eq!(solver[incidence], 1.0);
    }

    #[test]
    fn test_pin_count() {
        let mut g = Vccs::new("G1", 1e-3);
        assert!(g.connect(&[UnknownId(1), UnknownId(2)]).is_err());
    }
}
