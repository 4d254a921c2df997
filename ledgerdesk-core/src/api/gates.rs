use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::form::gate::SubmissionGate;

/// Gate plus the number of live leases on it.
type Gates = HashMap<Uuid, (Arc<SubmissionGate>, usize)>;

/// One submission gate per document id while a save is running.
///
/// Concurrent requests for the same document share a gate, so the second
/// one is turned away instead of saving twice. The entry goes away with the
/// last lease.
#[derive(Clone, Default)]
pub struct GateRegistry {
    gates: Arc<Mutex<Gates>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, id: Uuid) -> GateLease {
        let mut gates = self.lock();
        let (gate, leases) = gates
            .entry(id)
            .or_insert_with(|| (Arc::new(SubmissionGate::new()), 0));
        *leases += 1;
        GateLease {
            registry: self.clone(),
            id,
            gate: Arc::clone(gate),
        }
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Gates> {
        self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Access to a registry gate; releases it on drop.
pub struct GateLease {
    registry: GateRegistry,
    id: Uuid,
    gate: Arc<SubmissionGate>,
}

impl GateLease {
    pub fn gate(&self) -> &SubmissionGate {
        &self.gate
    }
}

impl Drop for GateLease {
    fn drop(&mut self) {
        let mut gates = self.registry.lock();
        let last = match gates.get_mut(&self.id) {
            Some((_, leases)) => {
                *leases -= 1;
                *leases == 0
            }
            None => false,
        };
        if last {
            gates.remove(&self.id);
        }
    }
}
