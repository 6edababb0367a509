//! Circuit validation.

use std::collections::HashMap;

use crate::error::{NodalError, Result};
use crate::simulation::Diagnostics;

use super::{Circuit, UnknownKind};

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one device
/// - Every device is bound to unknowns that exist in the registry
///
/// Nodes with a single connection are reported to `diagnostics` but
/// accepted.
pub fn validate_circuit(circuit: &Circuit, diagnostics: &mut Diagnostics) -> Result<()> {
    if circuit.is_empty() {
        return Err(NodalError::InvalidTopology {
            message: "Circuit has no devices".to_string(),
        });
    }

    let size = circuit.size();
    let mut references: HashMap<usize, usize> = HashMap::new();
    for device in circuit.devices() {
        for id in device.connections() {
            if id.index() > size {
                return Err(NodalError::InvalidTopology {
                    message: format!(
                        "'{}' is connected to unknown {} but only {} exist",
                        device.name(),
                        id.index(),
                        size
                    ),
                });
            }
            *references.entry(id.index()).or_default() += 1;
        }
    }

    for unknown in circuit.unknowns().iter() {
        if unknown.kind != UnknownKind::Voltage {
            continue;
        }
        match references.get(&unknown.id.index()) {
            None => {
                return Err(NodalError::InvalidTopology {
                    message: format!("Node '{}' is not connected to any device", unknown.name),
                });
            }
            Some(1) => {
                diagnostics.warn(format!("Node '{}' has only one connection", unknown.name));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
