// Start/stop-able continuous motion built from oscillators
//
// Driven by the runtime's cooperative tick. Starting and stopping both home
// every servo; a tick advances each oscillator once, in insertion order.

use tracing::{debug, info, warn};

use super::oscillator::Oscillator;
use crate::motor::{ServoBus, ServoId};

/// One servo driven by a cyclic mode
#[derive(Debug, Clone)]
struct Limb {
    name: String,
    id: ServoId,
    oscillator: Oscillator,
}

#[derive(Debug, Clone)]
pub struct CyclicController {
    name: String,
    limbs: Vec<Limb>,
    running: bool,
}

impl CyclicController {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limbs: Vec::new(),
            running: false,
        }
    }

    /// Add a servo; ticks visit servos in the order they were added
    pub fn with_limb(mut self, name: impl Into<String>, id: ServoId, oscillator: Oscillator) -> Self {
        self.limbs.push(Limb {
            name: name.into(),
            id,
            oscillator,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Current position of a named limb
    pub fn position(&self, limb: &str) -> Option<i32> {
        self.limbs
            .iter()
            .find(|l| l.name == limb)
            .map(|l| l.oscillator.position())
    }

    /// Start position of every servo, in tick order
    pub fn home_positions(&self) -> Vec<(ServoId, i32)> {
        self.limbs
            .iter()
            .map(|l| (l.id, l.oscillator.start_position()))
            .collect()
    }

    /// Idle -> Running, homing every servo first. No-op when already running.
    ///
    /// Returns the number of servos that could not be written.
    pub fn start<B: ServoBus>(&mut self, bus: &mut B) -> usize {
        if self.running {
            return 0;
        }
        info!("Starting {} motion", self.name);
        let faults = self.home_all(bus);
        self.running = true;
        faults
    }

    /// Running -> Idle, returning every servo to its start position.
    /// No-op when already idle.
    pub fn stop<B: ServoBus>(&mut self, bus: &mut B) -> usize {
        if !self.running {
            return 0;
        }
        info!("Stopping {} motion", self.name);
        self.running = false;
        self.home_all(bus)
    }

    /// Advance every oscillator once and write the new positions.
    ///
    /// A failed write is logged and the remaining servos still move.
    pub fn tick<B: ServoBus>(&mut self, bus: &mut B) -> usize {
        if !self.running {
            return 0;
        }

        let mut faults = 0;
        for limb in &mut self.limbs {
            let Some(position) = limb.oscillator.advance() else {
                continue;
            };
            if let Err(e) = bus.set_position(limb.id, position) {
                warn!("{}: failed to move {} to {}: {}", self.name, limb.name, position, e);
                faults += 1;
            }
        }
        faults
    }

    fn home_all<B: ServoBus>(&mut self, bus: &mut B) -> usize {
        let mut faults = 0;
        for limb in &mut self.limbs {
            let home = limb.oscillator.home();
            debug!("{}: homing {} to {}", self.name, limb.name, home);
            if let Err(e) = bus.set_position(limb.id, home) {
                warn!("{}: failed to home {}: {}", self.name, limb.name, e);
                faults += 1;
            }
        }
        faults
    }
}
