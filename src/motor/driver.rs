// Position-mode driver for the crawler servos
//
// Wraps the Feetech protocol behind the ServoBus trait: converts centidegrees
// and rpm into register values and refuses ids that were not configured.

use tracing::{debug, info, warn};

use super::feetech::{FeetechBus, OperatingMode};
use super::units::{centideg_to_steps, raw_to_rpm, rpm_to_raw};
use super::{BusError, ServoBus, ServoId};

/// Servo driver owning the serial bus and the set of attached servos
pub struct ServoDriver {
    bus: FeetechBus,
    servo_ids: Vec<ServoId>,
}

impl ServoDriver {
    /// Connect to the serial port for the given servos
    pub fn new(port: &str, servo_ids: Vec<ServoId>) -> Result<Self, BusError> {
        info!("Opening servo bus on {}", port);
        let bus = FeetechBus::open(port)?;
        Ok(Self { bus, servo_ids })
    }

    /// Initialize the servos for position control
    ///
    /// This must be called before sending position commands.
    /// It disables torque, sets position mode, and re-enables torque.
    pub fn initialize(&mut self) -> Result<(), BusError> {
        info!("Initializing servos {:?} for position control", self.servo_ids);

        for &id in &self.servo_ids {
            match self.bus.ping(id) {
                Ok(true) => debug!("Servo {} responding", id),
                Ok(false) => {
                    warn!("Servo {} not responding to ping", id);
                    return Err(BusError::Timeout { id });
                }
                Err(e) => return Err(e),
            }
        }

        // Torque must be off while the operating mode changes
        for &id in &self.servo_ids {
            self.bus.disable_torque(id)?;
        }
        for &id in &self.servo_ids {
            self.bus.set_operating_mode(id, OperatingMode::Position)?;
        }
        for &id in &self.servo_ids {
            self.bus.enable_torque(id)?;
        }

        info!("Servos initialized successfully");
        Ok(())
    }

    /// Disable torque on all servos (allows free movement)
    pub fn disable_torque(&mut self) -> Result<(), BusError> {
        info!("Disabling torque on all servos");
        for &id in &self.servo_ids {
            self.bus.disable_torque(id)?;
        }
        Ok(())
    }

    fn check(&self, id: ServoId) -> Result<(), BusError> {
        if self.servo_ids.contains(&id) {
            Ok(())
        } else {
            Err(BusError::UnknownServo { id })
        }
    }
}

impl ServoBus for ServoDriver {
    fn set_position(&mut self, id: ServoId, centideg: i32) -> Result<(), BusError> {
        self.check(id)?;
        self.bus.set_goal_position(id, centideg_to_steps(centideg))
    }

    fn set_speed(&mut self, id: ServoId, rpm: f64) -> Result<(), BusError> {
        self.check(id)?;
        self.bus.set_goal_speed(id, rpm_to_raw(rpm))
    }

    fn moving_speed(&mut self, id: ServoId) -> Result<f64, BusError> {
        self.check(id)?;
        Ok(raw_to_rpm(self.bus.get_goal_speed(id)?))
    }

    fn is_moving(&mut self, id: ServoId) -> Result<bool, BusError> {
        self.check(id)?;
        self.bus.is_moving(id)
    }
}

impl Drop for ServoDriver {
    fn drop(&mut self) {
        // Leave the legs limp rather than holding the last pose
        if let Err(e) = self.disable_torque() {
            warn!("Failed to disable torque on drop: {}", e);
        }
    }
}
