//! Unknown registry: allocates equation indices for named quantities.

use std::collections::HashMap;

use super::types::{Unknown, UnknownId, UnknownKind};
use crate::error::{NodalError, Result};

/// Names that always resolve to ground.
const GROUND_NAMES: [&str; 2] = ["0", "GND"];

/// Maps node and branch names onto consecutive equation indices.
///
/// Index 0 is ground. Indices are handed out in registration order and
/// never change. Once [`lock`](Self::lock)ed the registry refuses new
/// unknowns so the system size stays fixed after device binding.
#[derive(Debug, Clone)]
pub struct UnknownRegistry {
    map: HashMap<String, UnknownId>,
    unknowns: Vec<Unknown>,
    locked: bool,
}

impl Default for UnknownRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnknownRegistry {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        for name in GROUND_NAMES {
            map.insert(name.to_string(), UnknownId::GROUND);
        }
        Self {
            map,
            unknowns: vec![Unknown {
                id: UnknownId::GROUND,
                name: "0".to_string(),
                kind: UnknownKind::Voltage,
            }],
            locked: false,
        }
    }

    /// Number of unknowns, excluding ground.
    pub fn len(&self) -> usize {
        self.unknowns.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Freeze the registry.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Allow new unknowns again (used when a circuit is set up anew).
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Get the node voltage unknown `name`, creating it if needed.
    pub fn map_node(&mut self, name: &str) -> Result<UnknownId> {
        if let Some(&id) = self.map.get(name) {
            return Ok(id);
        }
        self.insert(name, UnknownKind::Voltage)
    }

    /// Create a new unknown. Fails if the name is taken.
    pub fn create(&mut self, name: &str, kind: UnknownKind) -> Result<UnknownId> {
        if self.map.contains_key(name) {
            return Err(NodalError::DuplicateUnknown {
                name: name.to_string(),
            });
        }
        self.insert(name, kind)
    }

    fn insert(&mut self, name: &str, kind: UnknownKind) -> Result<UnknownId> {
        if self.locked {
            return Err(NodalError::invalid_argument(format!(
                "cannot create unknown '{name}' after setup"
            )));
        }
        let id = UnknownId(self.unknowns.len());
        self.map.insert(name.to_string(), id);
        self.unknowns.push(Unknown {
            id,
            name: name.to_string(),
            kind,
        });
        log::trace!("Unknown {} = '{}' ({:?})", id.0, name, kind);
        Ok(id)
    }

    /// Look up an unknown by name.
    pub fn find(&self, name: &str) -> Option<UnknownId> {
        self.map.get(name).copied()
    }

    /// Look up an unknown by name, failing when it does not exist.
    pub fn get(&self, name: &str) -> Result<UnknownId> {
        self.find(name).ok_or_else(|| NodalError::UnknownNotFound {
            name: name.to_string(),
        })
    }

    /// Unknown with index `index`.
    pub fn unknown(&self, index: usize) -> Option<&Unknown> {
        self.unknowns.get(index)
    }

    /// Kind of unknown `index`. Ground and out-of-range indices report
    /// [`UnknownKind::Voltage`].
    pub fn kind(&self, index: usize) -> UnknownKind {
        self.unknowns
            .get(index)
            .map_or(UnknownKind::Voltage, |u| u.kind)
    }

    /// Iterate all unknowns except ground.
    pub fn iter(&self) -> impl Iterator<Item = &Unknown> {
        self.unknowns.iter().skip(1)
    }
}
