//! Circuit: named devices wired to registered unknowns.

use std::collections::HashSet;
use std::fmt;

use super::registry::UnknownRegistry;
use super::types::UnknownId;
use crate::behaviors::Device;
use crate::error::{NodalError, Result};

/// A complete circuit ready for simulation.
///
/// Devices are added with the names of the nodes their pins connect to.
/// Node unknowns are created on first use; branch currents and internal
/// nodes are registered by the devices themselves in [`setup`](Self::setup).
pub struct Circuit {
    /// Node and branch unknowns
    unknowns: UnknownRegistry,

    /// All devices, in insertion order
    devices: Vec<Box<dyn Device>>,

    /// Device names, for duplicate detection
    names: HashSet<String>,

    is_setup: bool,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("unknowns", &self.unknowns.len())
            .field("devices", &self.devices.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("is_setup", &self.is_setup)
            .finish()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self {
            unknowns: UnknownRegistry::new(),
            devices: Vec::new(),
            names: HashSet::new(),
            is_setup: false,
        }
    }

    /// Add `device` with its pins wired to the nodes named in `nodes`.
    ///
    /// "0" and "GND" are ground.
    pub fn add<D: Device + 'static>(&mut self, mut device: D, nodes: &[&str]) -> Result<()> {
        if self.is_setup {
            return Err(NodalError::invalid_argument(format!(
                "cannot add '{}' after setup",
                device.name()
            )));
        }
        let name = device.name().to_string();
        if self.names.contains(&name) {
            return Err(NodalError::DuplicateEntity { name });
        }
        let expected = device.pins().len();
        if nodes.len() != expected {
            return Err(NodalError::pin_count(name, expected, nodes.len()));
        }

        let pins = nodes
            .iter()
            .map(|node| self.unknowns.map_node(node))
            .collect::<Result<Vec<_>>>()?;
        device.connect(&pins)?;
        log::trace!("Added '{}' on {:?}", name, nodes);

        self.names.insert(name);
        self.devices.push(Box::new(device));
        Ok(())
    }

    /// Let every device register its own unknowns, then freeze the
    /// registry. Runs once.
    pub fn setup(&mut self) -> Result<()> {
        if self.is_setup {
            return Ok(());
        }
        for device in &mut self.devices {
            device.setup(&mut self.unknowns)?;
        }
        self.unknowns.lock();
        self.is_setup = true;
        log::debug!(
            "Circuit set up: {} devices, {} unknowns",
            self.devices.len(),
            self.unknowns.len()
        );
        Ok(())
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    /// Number of unknowns (ground excluded), i.e. the system size.
    pub fn size(&self) -> usize {
        self.unknowns.len()
    }

    pub fn unknowns(&self) -> &UnknownRegistry {
        &self.unknowns
    }

    /// Look up an unknown by name (node name or `<device>#branch`).
    pub fn unknown(&self, name: &str) -> Result<UnknownId> {
        self.unknowns.get(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> impl Iterator<Item = &(dyn Device + 'static)> {
        self.devices.iter().map(|d| d.as_ref())
    }

    pub(crate) fn devices_mut(&mut self) -> &mut [Box<dyn Device>] {
        &mut self.devices
    }

    /// Registry and devices borrowed together.
    pub(crate) fn parts_mut(&mut self) -> (&UnknownRegistry, &mut [Box<dyn Device>]) {
        (&self.unknowns, &mut self.devices)
    }

    /// Find a device by name.
    pub fn device(&self, name: &str) -> Option<&dyn Device> {
        self.devices().find(|d| d.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Resistor, VoltageSource};

    #[test]
    fn test_nodes_are_created_on_first_use() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", 1e3).unwrap(), &["in", "out"]).unwrap();
        circuit.add(Resistor::new("R2", 1e3).unwrap(), &["out", "0"]).unwrap();
        assert_eq!(circuit.size(), 2);
        assert_eq!(circuit.len(), 2);
        assert_eq!(circuit.unknown("out").unwrap(), UnknownId(2));
        assert!(circuit.device("R2").is_some());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", 1e3).unwrap(), &["a", "0"]).unwrap();
        let result = circuit.add(Resistor::new("R1", 2e3).unwrap(), &["b", "0"]);
        assert_eq!(
            result,
            Err(NodalError::DuplicateEntity {
                name: "R1".to_string()
            })
        );
    }

    #[test]
    fn test_pin_count_mismatch() {
        let mut circuit = Circuit::new();
        let result = circuit.add(Resistor::new("R1", 1e3).unwrap(), &["a"]);
        assert!(matches!(result, Err(NodalError::PinCountMismatch { .. })));
        assert_eq!(circuit.size(), 0);
    }

    #[test]
    fn test_setup_registers_branches_and_locks() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", 1.0), &["a", "0"]).unwrap();
        circuit.setup().unwrap();
        assert_eq!(circuit.size(), 2);
        assert!(circuit.unknown("V1#branch").is_ok());
        assert!(circuit
            .add(Resistor::new("R1", 1.0).unwrap(), &["a", "0"])
            .is_err());
    }
}
