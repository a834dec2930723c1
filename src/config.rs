// Loop timing, topics, servo layout and motion tuning
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::motion::{FailurePolicy, Mode, MotionError};
use crate::motor::ServoId;

// Runtime loop frequency (one cyclic tick per loop)
pub const LOOP_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "crawler/cmd/motion"; // commands
pub const TOPIC_STATE: &str = "crawler/state"; // runtime state

// Serial port for the Feetech servo bus
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

// Timed move estimates are in 100ms units
pub const NATIVE_UNITS_PER_SECOND: f64 = 10.0;

// Busy-flag polling for move_to_pos
pub const SETTLE_MAX_POLLS: u32 = 50;
pub const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

// Servo ids as configured on the robot
pub const SERVO_FRONT: ServoId = 0x35;
pub const SERVO_BACK: ServoId = 0x08;

// Back servo oscillation: centre per mode, swing either side, step per tick
const BACK_STEP: i32 = 350;
const BACK_DELTA: i32 = 700;
const FORWARD_CENTER: i32 = 0;
const LEFT_CENTER: i32 = -8500;
const RIGHT_CENTER: i32 = 8500;

// Front arm: paddles between up and down
const ARM_DOWN: i32 = 1000;
const ARM_UP: i32 = -7000;
const ARM_STEP: i32 = 150;

// Routine speeds (rpm)
const ARM_RPM: f64 = 20.0;
const SWING_RPM: f64 = 30.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A named servo on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoConfig {
    pub name: String,
    pub id: ServoId,
}

/// Oscillation of one servo within a cyclic mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimbConfig {
    pub servo: String,
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub start: i32,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

fn enabled() -> bool {
    true
}

/// A cyclic mode: limbs are ticked in the listed order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub mode: Mode,
    pub limbs: Vec<LimbConfig>,
}

/// One timed move within a routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveConfig {
    pub servo: String,
    pub from: i32,
    pub to: i32,
    pub speed_rpm: f64,
    #[serde(default)]
    pub run_short: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineConfig {
    pub name: String,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    pub steps: Vec<MoveConfig>,
}

/// Complete robot description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    pub servos: Vec<ServoConfig>,
    pub modes: Vec<ModeConfig>,
    #[serde(default)]
    pub routines: Vec<RoutineConfig>,
}

impl RobotConfig {
    /// Load a JSON description, replacing the built-in one
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn servo_id(&self, name: &str) -> Result<ServoId, MotionError> {
        self.servos
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| MotionError::UnknownServo(name.to_string()))
    }

    pub fn servo_ids(&self) -> Vec<ServoId> {
        self.servos.iter().map(|s| s.id).collect()
    }
}

fn back(center: i32) -> LimbConfig {
    LimbConfig {
        servo: "back".to_string(),
        min: center - BACK_DELTA,
        max: center + BACK_DELTA,
        step: BACK_STEP,
        start: center,
        enabled: true,
    }
}

fn arm() -> LimbConfig {
    LimbConfig {
        servo: "front".to_string(),
        min: ARM_UP,
        max: ARM_DOWN,
        step: ARM_STEP,
        start: ARM_DOWN,
        enabled: true,
    }
}

fn step(servo: &str, from: i32, to: i32, speed_rpm: f64, run_short: bool) -> MoveConfig {
    MoveConfig {
        servo: servo.to_string(),
        from,
        to,
        speed_rpm,
        run_short,
    }
}

/// Lift the arm, swing the back to `side`, lower the arm, re-centre
fn turn_step(name: &str, side: i32) -> RoutineConfig {
    RoutineConfig {
        name: name.to_string(),
        on_failure: FailurePolicy::Hold,
        steps: vec![
            step("front", ARM_DOWN, ARM_UP, ARM_RPM, false),
            step("back", FORWARD_CENTER, side, SWING_RPM, true),
            step("front", ARM_UP, ARM_DOWN, ARM_RPM, false),
            step("back", side, FORWARD_CENTER, SWING_RPM, false),
        ],
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        let forward_stroke = RoutineConfig {
            name: "forward_stroke".to_string(),
            on_failure: FailurePolicy::Hold,
            steps: vec![
                step("front", ARM_DOWN, ARM_UP, ARM_RPM, false),
                step("back", FORWARD_CENTER, BACK_DELTA, SWING_RPM, true),
                step("front", ARM_UP, ARM_DOWN, ARM_RPM, false),
                step("back", BACK_DELTA, -BACK_DELTA, SWING_RPM, true),
                step("back", -BACK_DELTA, FORWARD_CENTER, SWING_RPM, false),
            ],
        };

        Self {
            servos: vec![
                ServoConfig {
                    name: "front".to_string(),
                    id: SERVO_FRONT,
                },
                ServoConfig {
                    name: "back".to_string(),
                    id: SERVO_BACK,
                },
            ],
            modes: vec![
                ModeConfig {
                    mode: Mode::Forward,
                    limbs: vec![back(FORWARD_CENTER), arm()],
                },
                ModeConfig {
                    mode: Mode::TurnLeft,
                    limbs: vec![back(LEFT_CENTER), arm()],
                },
                ModeConfig {
                    mode: Mode::TurnRight,
                    limbs: vec![back(RIGHT_CENTER), arm()],
                },
            ],
            routines: vec![
                forward_stroke,
                turn_step("turn_left_step", LEFT_CENTER),
                turn_step("turn_right_step", RIGHT_CENTER),
            ],
        }
    }
}
