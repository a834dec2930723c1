// One absolute position change with an estimated completion time
//
// There is no completion feedback: run() commands the move and then waits for
// the estimate, so a caller awaiting run() can treat the move as finished.

use std::time::Duration;
use tracing::{debug, info};

use super::MotionError;
use crate::config::NATIVE_UNITS_PER_SECOND;
use crate::motor::{BusError, ServoBus, ServoId};

/// Converts degrees over rpm into native time units (60000 / 36000)
const DURATION_FACTOR: f64 = 5.0 / 3.0;

/// Proportional discount applied to run-short moves
const RUN_SHORT_SHRINK: f64 = 0.03;

/// Estimated duration of a move, in native time units
///
/// `run_short` subtracts one unit and then a further 3%, so chained moves
/// overlap slightly instead of stopping at every transition. The result can
/// be negative for tiny run-short moves.
pub fn estimate_duration(start: i32, end: i32, reported_rpm: f64, run_short: bool) -> f64 {
    let angle_delta = (start as f64 - end as f64).abs() / 100.0;
    let mut duration = DURATION_FACTOR * angle_delta / reported_rpm - f64::from(u8::from(run_short));
    if run_short {
        duration -= duration * RUN_SHORT_SHRINK;
    }
    duration
}

/// Wall-clock wait for an estimate in native time units
///
/// Negative estimates wait zero. `None` when the wait does not fit in a `Duration`.
pub fn native_to_duration(units: f64) -> Option<Duration> {
    Duration::try_from_secs_f64((units / NATIVE_UNITS_PER_SECOND).max(0.0)).ok()
}

#[derive(Debug, Clone)]
pub struct TimedMove {
    id: ServoId,
    start_position: i32,
    end_position: i32,
    speed_rpm: f64,
    reported_rpm: f64,
    estimated_duration: f64,
    wait: Duration,
}

impl TimedMove {
    /// Prepare a move, commanding the speed and reading back what the servo reports
    ///
    /// The estimate uses the reported speed. A reported speed that is not
    /// positive, or so small the wait cannot be represented, is rejected here.
    pub fn new<B: ServoBus>(
        bus: &mut B,
        id: ServoId,
        start_position: i32,
        end_position: i32,
        speed_rpm: f64,
        run_short: bool,
    ) -> Result<Self, MotionError> {
        bus.set_speed(id, speed_rpm)?;
        let reported_rpm = bus.moving_speed(id)?;
        if !reported_rpm.is_finite() || reported_rpm <= 0.0 {
            return Err(MotionError::NonPositiveSpeed {
                id,
                reported: reported_rpm,
            });
        }
        if reported_rpm != speed_rpm {
            debug!(
                "Servo {} reports {:.3} rpm for commanded {:.3} rpm",
                id, reported_rpm, speed_rpm
            );
        }

        let estimated_duration =
            estimate_duration(start_position, end_position, reported_rpm, run_short);
        let wait = native_to_duration(estimated_duration).ok_or(MotionError::UnrepresentableWait {
            id,
            estimate: estimated_duration,
        })?;

        Ok(Self {
            id,
            start_position,
            end_position,
            speed_rpm,
            reported_rpm,
            estimated_duration,
            wait,
        })
    }

    /// Command the move and wait for its estimated duration
    ///
    /// Safe to call repeatedly; each call re-issues the same move.
    pub async fn run<B: ServoBus>(&self, bus: &mut B) -> Result<(), BusError> {
        bus.set_speed(self.id, self.speed_rpm)?;
        bus.set_position(self.id, self.end_position)?;
        let wait = self.wait();
        info!(
            "Servo {}: {} -> {} ({:?})",
            self.id, self.start_position, self.end_position, wait
        );
        tokio::time::sleep(wait).await;
        Ok(())
    }

    pub fn id(&self) -> ServoId {
        self.id
    }

    pub fn start_position(&self) -> i32 {
        self.start_position
    }

    pub fn end_position(&self) -> i32 {
        self.end_position
    }

    pub fn reported_rpm(&self) -> f64 {
        self.reported_rpm
    }

    /// Estimate in native time units
    pub fn estimated_duration(&self) -> f64 {
        self.estimated_duration
    }

    /// Estimate as a wall-clock wait
    pub fn wait(&self) -> Duration {
        self.wait
    }
}
