//! Nodal - circuit simulation engine demo
//!
//! Runs one of the built-in networks through an analysis and prints the
//! results as CSV.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info nodal rc --analysis tran --step 1e-4 --stop 5e-3 > rc.csv
//! nodal diode --analysis op
//! nodal rlc --analysis ac --start 10 --stop 1e5 --points 10
//! ```

use clap::{Parser, ValueEnum};
use nodal_core::{
    components::{Capacitor, Diode, DiodeParams, Inductor, Resistor, VoltageSource, Waveform},
    integration::MethodKind,
    simulation::{BaseConfiguration, TimeConfiguration},
    Circuit, Result, Simulator, KELVIN,
};

/// Built-in networks
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Network {
    /// 10 V across two 1k resistors
    Divider,
    /// 1k / 1u low-pass driven by a 1 V pulse
    Rc,
    /// 5 V through 1k into a silicon diode
    Diode,
    /// Series RLC driven by a 1 V pulse
    Rlc,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Analysis {
    Op,
    Tran,
    Ac,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Method {
    Gear,
    Trap,
    Euler,
}

impl From<Method> for MethodKind {
    fn from(method: Method) -> Self {
        match method {
            Method::Gear => MethodKind::Gear,
            Method::Trap => MethodKind::Trapezoidal,
            Method::Euler => MethodKind::FixedEuler,
        }
    }
}

/// Sparse MNA circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Network to simulate
    #[arg(value_enum)]
    network: Network,

    /// Analysis to run
    #[arg(short, long, value_enum, default_value_t = Analysis::Tran)]
    analysis: Analysis,

    /// Integration method for transient analysis
    #[arg(short, long, value_enum, default_value_t = Method::Gear)]
    method: Method,

    /// Maximum Gear order
    #[arg(long, default_value_t = 2)]
    order: usize,

    /// Output timestep in seconds
    #[arg(long, default_value_t = 1e-4)]
    step: f64,

    /// Final time in seconds, or last frequency in Hz for AC
    #[arg(long, default_value_t = 5e-3)]
    stop: f64,

    /// First frequency in Hz for AC
    #[arg(long, default_value_t = 10.0)]
    start: f64,

    /// Frequencies per decade for AC
    #[arg(long, default_value_t = 10)]
    points: usize,

    /// Circuit temperature in Celsius
    #[arg(long, default_value_t = 27.0)]
    temp: f64,
}

fn build(network: Network) -> Result<Circuit> {
    let pulse = Waveform::Pulse {
        initial: 0.0,
        pulsed: 1.0,
        delay: 1e-4,
        rise: 1e-6,
        fall: 1e-6,
        width: 1.0,
        period: 0.0,
    };

    let mut circuit = Circuit::new();
    match network {
        Network::Divider => {
            circuit.add(VoltageSource::new("V1", 10.0).with_ac(1.0, 0.0), &["in", "0"])?;
            circuit.add(Resistor::new("R1", 1e3)?, &["in", "out"])?;
            circuit.add(Resistor::new("R2", 1e3)?, &["out", "0"])?;
        }
        Network::Rc => {
            circuit.add(VoltageSource::new("V1", pulse).with_ac(1.0, 0.0), &["in", "0"])?;
            circuit.add(Resistor::new("R1", 1e3)?, &["in", "out"])?;
            circuit.add(Capacitor::new("C1", 1e-6)?, &["out", "0"])?;
        }
        Network::Diode => {
            circuit.add(VoltageSource::new("V1", 5.0).with_ac(1.0, 0.0), &["in", "0"])?;
            circuit.add(Resistor::new("R1", 1e3)?, &["in", "out"])?;
            circuit.add(Diode::new("D1", DiodeParams::default())?, &["out", "0"])?;
        }
        Network::Rlc => {
            circuit.add(VoltageSource::new("V1", pulse).with_ac(1.0, 0.0), &["in", "0"])?;
            circuit.add(Resistor::new("R1", 10.0)?, &["in", "a"])?;
            circuit.add(Inductor::new("L1", 1e-3)?, &["a", "out"])?;
            circuit.add(Capacitor::new("C1", 1e-6)?, &["out", "0"])?;
        }
    }
    Ok(circuit)
}

fn header(sim: &Simulator, first: &str) -> String {
    let names: Vec<&str> = sim
        .circuit()
        .unknowns()
        .iter()
        .map(|unknown| unknown.name.as_str())
        .collect();
    format!("{first},{}", names.join(","))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = BaseConfiguration::default().with_temperature(args.temp + KELVIN);
    let mut sim = Simulator::with_config(build(args.network)?, config);
    sim.setup()?;

    match args.analysis {
        Analysis::Op => {
            let iterations = sim.operating_point()?;
            for unknown in sim.circuit().unknowns().iter() {
                println!("{},{:.9e}", unknown.name, sim.value_of(unknown.id)?);
            }
            log::info!("{} iterations", iterations);
        }
        Analysis::Tran => {
            let time = match args.method {
                Method::Gear => TimeConfiguration::new(args.step, args.stop).with_gear_order(args.order),
                method => TimeConfiguration::new(args.step, args.stop).with_method(method.into()),
            };
            println!("{}", header(&sim, "time"));
            let stats = sim.transient(&time, |point| {
                let values: Vec<String> = point.solution[1..]
                    .iter()
                    .map(|v| format!("{v:.9e}"))
                    .collect();
                println!("{:.9e},{}", point.time, values.join(","));
            })?;
            log::info!("{:?}", stats);
        }
        Analysis::Ac => {
            let decades = (args.stop / args.start).log10().max(0.0);
            let count = (decades * args.points as f64).ceil() as usize + 1;
            let frequencies: Vec<f64> = (0..count)
                .map(|k| args.start * 10f64.powf(k as f64 / args.points.max(1) as f64))
                .collect();
            println!("{}", header(&sim, "frequency"));
            for (frequency, solution) in frequencies.iter().zip(sim.frequency_sweep(&frequencies)?) {
                let values: Vec<String> = solution[1..]
                    .iter()
                    .map(|x| format!("{:.6e}", x.norm()))
                    .collect();
                println!("{:.6e},{}", frequency, values.join(","));
            }
        }
    }

    for warning in sim.warnings() {
        eprintln!("warning: {warning}");
    }
    Ok(())
}
