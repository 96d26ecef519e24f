use serde::{Deserialize, Serialize};

use crate::gate::{Gate, GateKey, GateKind};

/// A named set of gates, unique by [`GateKey`].
///
/// An absent flag and a flag with no gates are the same thing: both
/// evaluate to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    name: String,
    gates: Vec<Gate>,
}

impl Flag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gates: Vec::new(),
        }
    }

    /// Build a flag from stored gates. Later gates replace earlier ones with
    /// the same key.
    pub fn with_gates(name: impl Into<String>, gates: impl IntoIterator<Item = Gate>) -> Self {
        let mut flag = Self::new(name);
        for gate in gates {
            flag.merge(gate);
        }
        flag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Insert `gate`, replacing any existing gate with the same key.
    pub fn merge(&mut self, gate: Gate) {
        let key = gate.key();
        match self.gates.iter_mut().find(|g| g.has_key(&key)) {
            Some(existing) => *existing = gate,
            None => self.gates.push(gate),
        }
    }

    /// Remove the gate with `key`. Returns whether one was present.
    pub fn remove(&mut self, key: &GateKey) -> bool {
        let before = self.gates.len();
        self.gates.retain(|g| !g.has_key(key));
        self.gates.len() != before
    }

    pub fn get(&self, key: &GateKey) -> Option<&Gate> {
        self.gates.iter().find(|g| g.has_key(key))
    }

    pub fn boolean_gate(&self) -> Option<&Gate> {
        self.gates.iter().find(|g| g.kind() == GateKind::Boolean)
    }

    pub fn actor_gate(&self, actor_id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.is_for_actor(actor_id))
    }

    pub fn group_gates(&self) -> impl Iterator<Item = &Gate> {
        self.gates.iter().filter(|g| g.kind() == GateKind::Group)
    }
}
