// Ordered chain of timed moves forming one maneuver
//
// Moves run strictly one after another; awaiting each move's estimated
// duration is what keeps the next one from starting early.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::MotionError;
use super::timed_move::TimedMove;
use crate::config::{RobotConfig, RoutineConfig};
use crate::motor::{ServoBus, ServoId};

/// What to do with the servos when a move fails part way through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Leave servos where the last successful move put them
    #[default]
    Hold,
    /// Send every servo in the routine back to the start of its first move
    ReturnHome,
}

#[derive(Debug, Clone)]
pub struct Routine {
    name: String,
    moves: Vec<TimedMove>,
    on_failure: FailurePolicy,
}

impl Routine {
    pub fn new(name: impl Into<String>, on_failure: FailurePolicy) -> Self {
        Self {
            name: name.into(),
            moves: Vec::new(),
            on_failure,
        }
    }

    pub fn with_move(mut self, mv: TimedMove) -> Self {
        self.moves.push(mv);
        self
    }

    /// Build a routine from configuration, preparing every move on the bus
    pub fn build<B: ServoBus>(
        bus: &mut B,
        config: &RoutineConfig,
        robot: &RobotConfig,
    ) -> Result<Self, MotionError> {
        let mut routine = Self::new(&config.name, config.on_failure);
        for step in &config.steps {
            let id = robot.servo_id(&step.servo)?;
            let mv = TimedMove::new(bus, id, step.from, step.to, step.speed_rpm, step.run_short)?;
            routine = routine.with_move(mv);
        }
        Ok(routine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn moves(&self) -> &[TimedMove] {
        &self.moves
    }

    /// Run every move in order, always starting from the first one
    ///
    /// The first failing move aborts the rest of the routine.
    pub async fn execute<B: ServoBus>(&self, bus: &mut B) -> Result<(), MotionError> {
        info!("Executing routine {} ({} moves)", self.name, self.moves.len());

        for (step, mv) in self.moves.iter().enumerate() {
            if let Err(source) = mv.run(bus).await {
                warn!("Routine {} failed at step {}: {}", self.name, step, source);
                if self.on_failure == FailurePolicy::ReturnHome {
                    self.return_home(bus);
                }
                return Err(MotionError::RoutineAborted {
                    routine: self.name.clone(),
                    step,
                    source,
                });
            }
        }

        info!("Routine {} complete", self.name);
        Ok(())
    }

    /// Start position of each servo's first move, in order of appearance
    pub fn home_positions(&self) -> Vec<(ServoId, i32)> {
        let mut homes: Vec<(ServoId, i32)> = Vec::new();
        for mv in &self.moves {
            if !homes.iter().any(|&(id, _)| id == mv.id()) {
                homes.push((mv.id(), mv.start_position()));
            }
        }
        homes
    }

    fn return_home<B: ServoBus>(&self, bus: &mut B) {
        for (id, position) in self.home_positions() {
            if let Err(e) = bus.set_position(id, position) {
                warn!("Routine {}: failed to return servo {} home: {}", self.name, id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MoveConfig;
    use crate::motor::{BusCall, BusError, SimBus};
    use std::time::Duration;
    use tokio::time::Instant;

    const FRONT: ServoId = 0x35;
    const BACK: ServoId = 0x08;

    // 30 rpm reads back exactly, so 90 degrees takes 500ms
    fn turn(bus: &mut SimBus, on_failure: FailurePolicy) -> Routine {
        Routine::new("turn", on_failure)
            .with_move(TimedMove::new(bus, FRONT, 1000, -8000, 30.0, false).unwrap())
            .with_move(TimedMove::new(bus, BACK, 0, -9000, 30.0, false).unwrap())
            .with_move(TimedMove::new(bus, FRONT, -8000, 1000, 30.0, false).unwrap())
            .with_move(TimedMove::new(bus, BACK, -9000, 0, 30.0, false).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_moves_wait_for_previous() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let routine = turn(&mut bus, FailurePolicy::Hold);
        bus.clear_log();

        let started = Instant::now();
        routine.execute(&mut bus).await.unwrap();

        let goals: Vec<(Duration, ServoId, i32)> = bus
            .timed_calls()
            .iter()
            .filter_map(|(at, call)| match *call {
                BusCall::SetPosition { id, centideg } => Some((*at - started, id, centideg)),
                _ => None,
            })
            .collect();
        assert_eq!(
            goals,
            vec![
                (Duration::ZERO, FRONT, -8000),
                (Duration::from_millis(500), BACK, -9000),
                (Duration::from_millis(1000), FRONT, 1000),
                (Duration::from_millis(1500), BACK, 0),
            ]
        );
        assert_eq!(started.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_execute_starts_from_first_move() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let routine = turn(&mut bus, FailurePolicy::Hold);
        bus.clear_log();

        bus.fail_writes(FRONT, true);
        // FRONT moves third too, but the first move already fails
        assert!(routine.execute(&mut bus).await.is_err());
        bus.fail_writes(FRONT, false);

        routine.execute(&mut bus).await.unwrap();
        assert_eq!(
            bus.positions_written(),
            vec![(FRONT, -8000), (BACK, -9000), (FRONT, 1000), (BACK, 0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_and_holds() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let routine = turn(&mut bus, FailurePolicy::Hold);
        bus.clear_log();
        bus.fail_writes(BACK, true);

        let err = routine.execute(&mut bus).await.unwrap_err();
        match err {
            MotionError::RoutineAborted { routine, step, source } => {
                assert_eq!(routine, "turn");
                assert_eq!(step, 1);
                assert!(matches!(source, BusError::Timeout { id: BACK }));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing after the failed move, and no rollback
        assert_eq!(bus.positions_written(), vec![(FRONT, -8000)]);
        assert_eq!(bus.position(FRONT), Some(-8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_can_return_home() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let routine = turn(&mut bus, FailurePolicy::ReturnHome);
        bus.clear_log();
        bus.fail_writes(BACK, true);

        assert!(routine.execute(&mut bus).await.is_err());
        // Front is sent home, back still fails and is only logged
        assert_eq!(bus.positions_written(), vec![(FRONT, -8000), (FRONT, 1000)]);
    }

    #[test]
    fn test_home_positions_first_appearance() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let routine = turn(&mut bus, FailurePolicy::Hold);
        assert_eq!(routine.home_positions(), vec![(FRONT, 1000), (BACK, 0)]);
    }

    #[test]
    fn test_build_from_config() {
        let robot = RobotConfig::default();
        let mut bus = SimBus::new(robot.servo_ids());
        let config = RoutineConfig {
            name: "nudge".to_string(),
            on_failure: FailurePolicy::Hold,
            steps: vec![
                MoveConfig {
                    servo: "back".to_string(),
                    from: 0,
                    to: 700,
                    speed_rpm: 30.0,
                    run_short: true,
                },
                MoveConfig {
                    servo: "back".to_string(),
                    from: 700,
                    to: 0,
                    speed_rpm: 30.0,
                    run_short: false,
                },
            ],
        };

        let routine = Routine::build(&mut bus, &config, &robot).unwrap();
        assert_eq!(routine.name(), "nudge");
        assert_eq!(routine.moves().len(), 2);
        assert!(routine.moves()[0].estimated_duration() < routine.moves()[1].estimated_duration());
    }

    #[test]
    fn test_build_rejects_unknown_servo() {
        let robot = RobotConfig::default();
        let mut bus = SimBus::new(robot.servo_ids());
        let config = RoutineConfig {
            name: "bad".to_string(),
            on_failure: FailurePolicy::Hold,
            steps: vec![MoveConfig {
                servo: "tail".to_string(),
                from: 0,
                to: 100,
                speed_rpm: 30.0,
                run_short: false,
            }],
        };
        assert!(matches!(
            Routine::build(&mut bus, &config, &robot),
            Err(MotionError::UnknownServo(name)) if name == "tail"
        ));
    }
}
