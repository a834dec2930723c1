// Motion core for the crawler
//
// Provides:
// - Bounded oscillators and the cyclic modes built from them
// - Timed absolute moves and the routines that chain them
// - The arbitrator that keeps at most one cyclic mode running

pub mod arbitrator;
pub mod cyclic;
pub mod oscillator;
pub mod routine;
pub mod timed_move;

pub use arbitrator::{Action, Arbitrator, Mode, MotionStatus, PollConfig, move_to_pos};
pub use cyclic::CyclicController;
pub use oscillator::Oscillator;
pub use routine::{FailurePolicy, Routine};
pub use timed_move::TimedMove;

use crate::motor::{BusError, ServoId};

/// Errors raised by the motion core
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("Invalid oscillator bounds: min {min} is above max {max}")]
    InvalidBounds { min: i32, max: i32 },

    #[error("Invalid oscillator step {step}: must not be negative")]
    NegativeStep { step: i32 },

    #[error("Servo {id} reports speed {reported} rpm, a timed move needs a positive speed")]
    NonPositiveSpeed { id: ServoId, reported: f64 },

    #[error("Servo {id}: estimated wait of {estimate} units does not fit in a duration")]
    UnrepresentableWait { id: ServoId, estimate: f64 },

    #[error("No servo named '{0}' is configured")]
    UnknownServo(String),

    #[error("No routine named '{0}' is configured")]
    UnknownRoutine(String),

    #[error("Mode {0:?} is not configured")]
    UnconfiguredMode(Mode),

    #[error("Routine '{routine}' aborted at step {step}: {source}")]
    RoutineAborted {
        routine: String,
        step: usize,
        #[source]
        source: BusError,
    },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}
