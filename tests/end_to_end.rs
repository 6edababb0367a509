//! Whole-engine runs on small reference networks.

use approx::assert_abs_diff_eq;
use nodal_core::behaviors::{connect_pins, ConductanceStamp, CurrentStamp, Device, Loadable};
use nodal_core::circuit::UnknownId;
use nodal_core::components::{
    Capacitor, Diode, DiodeParams, Inductor, Resistor, Vcvs, VoltageSource, Waveform,
};
use nodal_core::integration::MethodKind;
use nodal_core::simulation::{BaseConfiguration, SimulationState, TimeConfiguration};
use nodal_core::solver::Solver;
use nodal_core::{Circuit, NodalError, Result, Simulator};

fn series_rc() -> Circuit {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", 10.0), &["in", "0"]).unwrap();
    circuit.add(Resistor::new("R1", 10.0).unwrap(), &["in", "out"]).unwrap();
    circuit.add(Capacitor::new("C1", 20.0).unwrap(), &["out", "0"]).unwrap();
    circuit
}

fn assert_settled_at_ten(method: MethodKind) {
    let mut sim = Simulator::new(series_rc());
    let out = sim.circuit().unknown("out").unwrap();
    let config = TimeConfiguration::new(1.0, 10.0).with_method(method);
    let mut points = 0;
    sim.transient(&config, |point| {
        assert_abs_diff_eq!(point.value(out), 10.0, epsilon = 1e-9);
        points += 1;
    })
    .unwrap();
    assert!(points > 1);
}

#[test]
fn rc_steady_state_with_gear() {
    assert_settled_at_ten(MethodKind::Gear);
}

#[test]
fn rc_steady_state_with_fixed_euler() {
    assert_settled_at_ten(MethodKind::FixedEuler);
}

#[test]
fn rc_steady_state_with_trapezoidal() {
    assert_settled_at_ten(MethodKind::Trapezoidal);
}

#[test]
fn resistive_divider_takes_one_iteration() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", 10.0), &["in", "0"]).unwrap();
    circuit.add(Resistor::new("R1", 3e3).unwrap(), &["in", "out"]).unwrap();
    circuit.add(Resistor::new("R2", 1e3).unwrap(), &["out", "0"]).unwrap();
    let mut sim = Simulator::new(circuit);

    assert_eq!(sim.operating_point().unwrap(), 1);
    assert_abs_diff_eq!(sim.value("out").unwrap(), 2.5, epsilon = 1e-12);
    // Again, starting from the previous answer
    assert_eq!(sim.operating_point().unwrap(), 1);
    assert_abs_diff_eq!(sim.value("out").unwrap(), 2.5, epsilon = 1e-12);
    assert_abs_diff_eq!(sim.value("V1#branch").unwrap(), -2.5e-3, epsilon = 1e-15);
}

#[test]
fn rc_charging_with_trapezoidal() {
    let step = Waveform::Pulse {
        initial: 0.0,
        pulsed: 1.0,
        delay: 0.0,
        rise: 1e-9,
        fall: 1e-9,
        width: 1.0,
        period: 0.0,
    };
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", step), &["in", "0"]).unwrap();
    circuit.add(Resistor::new("R1", 1e3).unwrap(), &["in", "out"]).unwrap();
    circuit.add(Capacitor::new("C1", 1e-6).unwrap(), &["out", "0"]).unwrap();
    let mut sim = Simulator::new(circuit);
    let out = sim.circuit().unknown("out").unwrap();

    let config = TimeConfiguration::new(1e-4, 5e-3)
        .with_max_step(2e-5)
        .with_method(MethodKind::Trapezoidal);
    let mut last = (0.0, 0.0);
    sim.transient(&config, |point| last = (point.time, point.value(out)))
        .unwrap();
    let expected = 1.0 - (-(last.0 - 1e-9) / 1e-3).exp();
    assert_abs_diff_eq!(last.1, expected, epsilon = 1e-3);
}

#[test]
fn rl_current_rises_to_source_over_resistance() {
    let mut circuit = Circuit::new();
    let step = Waveform::Pulse {
        initial: 0.0,
        pulsed: 1.0,
        delay: 0.0,
        rise: 1e-9,
        fall: 1e-9,
        width: 1.0,
        period: 0.0,
    };
    circuit.add(VoltageSource::new("V1", step), &["in", "0"]).unwrap();
    circuit.add(Resistor::new("R1", 100.0).unwrap(), &["in", "a"]).unwrap();
    circuit.add(Inductor::new("L1", 0.1).unwrap(), &["a", "0"]).unwrap();
    let mut sim = Simulator::new(circuit);
    let branch = sim.circuit().unknown("L1#branch").unwrap();

    // Time constant L/R = 1ms
    let config = TimeConfiguration::new(1e-4, 1e-2);
    let mut last = 0.0;
    sim.transient(&config, |point| last = point.value(branch)).unwrap();
    assert_abs_diff_eq!(last, 1e-2, epsilon = 1e-5);
}

#[test]
fn diode_clamp_operating_point() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", 10.0), &["in", "0"]).unwrap();
    circuit.add(Resistor::new("R1", 1e3).unwrap(), &["in", "out"]).unwrap();
    circuit
        .add(Diode::new("D1", DiodeParams::default()).unwrap(), &["out", "0"])
        .unwrap();
    circuit
        .add(Diode::new("D2", DiodeParams::default()).unwrap(), &["out", "0"])
        .unwrap();
    let mut sim = Simulator::new(circuit);
    sim.operating_point().unwrap();
    let v = sim.value("out").unwrap();
    assert!(v > 0.55 && v < 0.8, "clamp voltage {v}");
}

#[test]
fn amplifier_feedback() {
    // Non-inverting amplifier built from a high-gain VCVS: gain -> 1 + R2/R1
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", 0.1), &["in", "0"]).unwrap();
    circuit
        .add(Vcvs::new("E1", 1e6), &["out", "0", "in", "fb"])
        .unwrap();
    circuit.add(Resistor::new("R2", 9e3).unwrap(), &["out", "fb"]).unwrap();
    circuit.add(Resistor::new("R1", 1e3).unwrap(), &["fb", "0"]).unwrap();
    let mut sim = Simulator::new(circuit);
    assert_eq!(sim.operating_point().unwrap(), 1);
    assert_abs_diff_eq!(sim.value("out").unwrap(), 1.0, epsilon = 1e-4);
}

/// Draws `(v - 0.3)^2 + 1` from its node, which no voltage can balance.
struct NoRoot {
    nodes: [UnknownId; 1],
    conductance: ConductanceStamp,
    current: CurrentStamp,
}

impl Loadable for NoRoot {
    fn name(&self) -> &str {
        "X1"
    }

    fn pins(&self) -> &'static [&'static str] {
        &["node"]
    }

    fn connect(&mut self, pins: &[UnknownId]) -> Result<()> {
        connect_pins("X1", &mut self.nodes, pins)
    }

    fn connections(&self) -> Vec<UnknownId> {
        self.nodes.to_vec()
    }

    fn bind(&mut self, solver: &mut Solver<f64>) -> Result<()> {
        self.conductance = ConductanceStamp::bind(solver, self.nodes[0], UnknownId::GROUND)?;
        self.current = CurrentStamp::bind(solver, self.nodes[0], UnknownId::GROUND)?;
        Ok(())
    }

    fn load(&mut self, solver: &mut Solver<f64>, state: &mut SimulationState) -> Result<()> {
        let v = state.solution[self.nodes[0].index()];
        let g = 2.0 * (v - 0.3);
        self.conductance.stamp(solver, g);
        self.current.stamp(solver, (v - 0.3).powi(2) + 1.0 - g * v);
        Ok(())
    }

    fn is_nonlinear(&self) -> bool {
        true
    }
}

impl Device for NoRoot {}

#[test]
fn unsolvable_network_reports_convergence_failure() {
    let mut circuit = Circuit::new();
    let device = NoRoot {
        nodes: [UnknownId::GROUND],
        conductance: ConductanceStamp::default(),
        current: CurrentStamp::default(),
    };
    circuit.add(device, &["a"]).unwrap();
    circuit.add(Resistor::new("R1", 1e6).unwrap(), &["a", "0"]).unwrap();

    let config = BaseConfiguration::default().with_dc_max_iterations(50);
    let mut sim = Simulator::with_config(circuit, config);
    let err = sim.operating_point().unwrap_err();
    assert!(matches!(err, NodalError::ConvergenceFailure { .. }), "{err}");
    assert_eq!(sim.warnings().len(), 2);
}
