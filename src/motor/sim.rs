// In-memory servo bus
//
// Stands in for the serial bus when running with --sim and in tests. Speeds go
// through the same register quantization as the real servos, and every call that
// reaches a servo is recorded with a timestamp.

use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::debug;

use super::units::{raw_to_rpm, rpm_to_raw};
use super::{BusError, ServoBus, ServoId};

/// A call that reached a simulated servo
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    SetPosition { id: ServoId, centideg: i32 },
    SetSpeed { id: ServoId, rpm: f64 },
    ReadSpeed { id: ServoId },
    ReadMoving { id: ServoId },
}

#[derive(Debug, Default)]
struct SimServo {
    position: i32,
    speed_raw: u16,
    busy_reads: u32,
    fail_writes: bool,
    fail_reads: bool,
}

/// Simulated servo bus
#[derive(Debug, Default)]
pub struct SimBus {
    servos: BTreeMap<ServoId, SimServo>,
    log: Vec<(Instant, BusCall)>,
}

impl SimBus {
    pub fn new(ids: impl IntoIterator<Item = ServoId>) -> Self {
        Self {
            servos: ids.into_iter().map(|id| (id, SimServo::default())).collect(),
            log: Vec::new(),
        }
    }

    /// Last commanded position of a servo
    pub fn position(&self, id: ServoId) -> Option<i32> {
        self.servos.get(&id).map(|s| s.position)
    }

    /// Recorded calls in order
    pub fn calls(&self) -> impl Iterator<Item = &BusCall> {
        self.log.iter().map(|(_, call)| call)
    }

    /// Recorded calls with the time each one happened
    pub fn timed_calls(&self) -> &[(Instant, BusCall)] {
        &self.log
    }

    /// Positions written so far, in order
    pub fn positions_written(&self) -> Vec<(ServoId, i32)> {
        self.calls()
            .filter_map(|call| match *call {
                BusCall::SetPosition { id, centideg } => Some((id, centideg)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Make writes to a servo fail until cleared
    pub fn fail_writes(&mut self, id: ServoId, fail: bool) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.fail_writes = fail;
        }
    }

    /// Make register reads from a servo fail until cleared
    pub fn fail_reads(&mut self, id: ServoId, fail: bool) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.fail_reads = fail;
        }
    }

    /// Report the servo as busy for the next `reads` busy-flag reads
    pub fn set_busy_reads(&mut self, id: ServoId, reads: u32) {
        if let Some(servo) = self.servos.get_mut(&id) {
            servo.busy_reads = reads;
        }
    }

    fn servo(&mut self, id: ServoId, write: bool) -> Result<&mut SimServo, BusError> {
        let servo = self
            .servos
            .get_mut(&id)
            .ok_or(BusError::UnknownServo { id })?;
        if (write && servo.fail_writes) || (!write && servo.fail_reads) {
            return Err(BusError::Timeout { id });
        }
        Ok(servo)
    }

    fn record(&mut self, call: BusCall) {
        debug!("sim bus: {:?}", call);
        self.log.push((Instant::now(), call));
    }
}

impl ServoBus for SimBus {
    fn set_position(&mut self, id: ServoId, centideg: i32) -> Result<(), BusError> {
        self.servo(id, true)?.position = centideg;
        self.record(BusCall::SetPosition { id, centideg });
        Ok(())
    }

    fn set_speed(&mut self, id: ServoId, rpm: f64) -> Result<(), BusError> {
        self.servo(id, true)?.speed_raw = rpm_to_raw(rpm);
        self.record(BusCall::SetSpeed { id, rpm });
        Ok(())
    }

    fn moving_speed(&mut self, id: ServoId) -> Result<f64, BusError> {
        let rpm = raw_to_rpm(self.servo(id, false)?.speed_raw);
        self.record(BusCall::ReadSpeed { id });
        Ok(rpm)
    }

    fn is_moving(&mut self, id: ServoId) -> Result<bool, BusError> {
        let servo = self.servo(id, false)?;
        let busy = servo.busy_reads > 0;
        servo.busy_reads = servo.busy_reads.saturating_sub(1);
        self.record(BusCall::ReadMoving { id });
        Ok(busy)
    }
}
