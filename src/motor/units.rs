// Unit conversions between the motion core and Feetech STS registers
// Converts centidegree positions and rpm speeds to raw register values and back.

/// Motor resolution: 4096 steps per revolution
pub const STEPS_PER_REVOLUTION: f64 = 4096.0;

/// Raw position of the mechanical centre (0 centidegrees)
pub const CENTER_STEP: u16 = 2048;

/// Highest raw goal position
pub const MAX_STEP: u16 = 4095;

/// Centidegrees in one full revolution
const CENTIDEG_PER_REVOLUTION: f64 = 36_000.0;

/// Highest raw speed the servo accepts (steps/s, roughly 50 rpm)
pub const MAX_RAW_SPEED: u16 = 3400;

/// Convert a signed centidegree position to a raw goal position
pub fn centideg_to_steps(centideg: i32) -> u16 {
    let offset = (centideg as f64 * STEPS_PER_REVOLUTION / CENTIDEG_PER_REVOLUTION).round() as i32;
    (CENTER_STEP as i32 + offset).clamp(0, MAX_STEP as i32) as u16
}

/// Convert a raw position back to centidegrees relative to centre
pub fn steps_to_centideg(steps: u16) -> i32 {
    let offset = steps as f64 - CENTER_STEP as f64;
    (offset * CENTIDEG_PER_REVOLUTION / STEPS_PER_REVOLUTION).round() as i32
}

/// Convert rpm to a raw speed register value (steps/s)
///
/// Non-positive speeds encode as 0. Values above the servo limit are clamped,
/// so the speed read back can be lower than what was asked for.
pub fn rpm_to_raw(rpm: f64) -> u16 {
    if !rpm.is_finite() || rpm <= 0.0 {
        return 0;
    }
    let raw = (rpm * STEPS_PER_REVOLUTION / 60.0).round();
    raw.min(MAX_RAW_SPEED as f64) as u16
}

/// Convert a raw speed register value (steps/s) to rpm
pub fn raw_to_rpm(raw: u16) -> f64 {
    raw as f64 * 60.0 / STEPS_PER_REVOLUTION
}
