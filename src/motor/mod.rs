// Servo hardware binding for the crawler
//
// Provides:
// - The ServoBus trait the motion core talks to
// - Feetech STS serial protocol implementation
// - Position-mode driver and unit conversions
// - An in-memory simulated bus for --sim runs and tests

mod driver;
pub mod feetech;
pub mod sim;
pub mod units;

pub use driver::ServoDriver;
pub use feetech::FeetechBus;
pub use sim::{BusCall, SimBus};

/// Servo address on the bus
pub type ServoId = u8;

/// Error types for servo bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: ServoId, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: ServoId },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoStatus { id: ServoId, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: ServoId },

    #[error("Servo {id} is not attached to this bus")]
    UnknownServo { id: ServoId },
}

/// Handle to the physical servos.
///
/// One value owns the whole bus; components borrow it for the duration of a
/// call instead of holding their own references to individual servos.
/// Positions are centidegrees (hundredths of a degree, signed, 0 = centre),
/// speeds are revolutions per minute.
pub trait ServoBus {
    /// Command an absolute goal position
    fn set_position(&mut self, id: ServoId, centideg: i32) -> Result<(), BusError>;

    /// Command the speed used for subsequent position moves
    fn set_speed(&mut self, id: ServoId, rpm: f64) -> Result<(), BusError>;

    /// Speed the servo reports back, which may differ from the commanded one
    fn moving_speed(&mut self, id: ServoId) -> Result<f64, BusError>;

    /// Busy flag: true while the servo is still travelling to its goal
    fn is_moving(&mut self, id: ServoId) -> Result<bool, BusError>;
}

impl<B: ServoBus + ?Sized> ServoBus for &mut B {
    fn set_position(&mut self, id: ServoId, centideg: i32) -> Result<(), BusError> {
        (**self).set_position(id, centideg)
    }

    fn set_speed(&mut self, id: ServoId, rpm: f64) -> Result<(), BusError> {
        (**self).set_speed(id, rpm)
    }

    fn moving_speed(&mut self, id: ServoId) -> Result<f64, BusError> {
        (**self).moving_speed(id)
    }

    fn is_moving(&mut self, id: ServoId) -> Result<bool, BusError> {
        (**self).is_moving(id)
    }
}
