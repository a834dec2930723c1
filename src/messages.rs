// Message types exchanged with teleop and monitoring

use serde::{Deserialize, Serialize};

use crate::motion::Mode;

/// Directional command from teleop/scripts -> runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum MotionCommand {
    Forward,
    TurnLeft,
    TurnRight,
    Back,
    Stop,
    /// Run a named one-shot maneuver
    Routine { name: String },
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    /// The last cycle hit a device error
    Degraded,
}

/// State published by runtime every loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeState {
    pub active_mode: Option<Mode>,
    pub health: RuntimeHealth,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let cmd: MotionCommand = serde_json::from_str(r#"{"cmd":"turn_left"}"#).unwrap();
        assert_eq!(cmd, MotionCommand::TurnLeft);

        let cmd: MotionCommand =
            serde_json::from_str(r#"{"cmd":"routine","name":"forward_stroke"}"#).unwrap();
        assert_eq!(
            cmd,
            MotionCommand::Routine {
                name: "forward_stroke".to_string()
            }
        );

        assert!(serde_json::from_str::<MotionCommand>(r#"{"cmd":"jump"}"#).is_err());
    }

    #[test]
    fn test_state_wire_format() {
        let state = RuntimeState {
            active_mode: Some(Mode::TurnRight),
            health: RuntimeHealth::Ok,
            last_error: None,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "active_mode": "turn_right", "health": "ok", "last_error": null })
        );
    }
}
