// Single-active-mode discipline across the motion modes
//
// Activating a mode always stops every running mode first (homing its
// servos), so at most one cyclic controller is ever running.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use super::cyclic::CyclicController;
use super::oscillator::Oscillator;
use super::routine::Routine;
use super::MotionError;
use crate::config::{RobotConfig, SETTLE_MAX_POLLS, SETTLE_POLL_INTERVAL};
use crate::messages::MotionCommand;
use crate::motor::{BusError, ServoBus, ServoId};

/// Continuous motion modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Forward,
    TurnLeft,
    TurnRight,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Forward => "forward",
            Mode::TurnLeft => "turn_left",
            Mode::TurnRight => "turn_right",
        }
    }
}

/// What a command asks the arbitrator to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Activate(Mode),
    Routine(String),
    Stop,
}

impl From<&MotionCommand> for Action {
    fn from(cmd: &MotionCommand) -> Self {
        match cmd {
            MotionCommand::Forward => Action::Activate(Mode::Forward),
            MotionCommand::TurnLeft => Action::Activate(Mode::TurnLeft),
            MotionCommand::TurnRight => Action::Activate(Mode::TurnRight),
            // No reverse gait, backing off just stops
            MotionCommand::Back | MotionCommand::Stop => Action::Stop,
            MotionCommand::Routine { name } => Action::Routine(name.clone()),
        }
    }
}

/// Outcome of polling a servo's busy flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    StillMoving,
    Complete,
    /// The busy flag could not be read
    Unknown,
}

/// Bounded busy-flag polling
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub max_polls: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_polls: SETTLE_MAX_POLLS,
            interval: SETTLE_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Default)]
pub struct Arbitrator {
    modes: Vec<(Mode, CyclicController)>,
    routines: Vec<Routine>,
    active: Option<Mode>,
}

impl Arbitrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Mode, controller: CyclicController) -> Self {
        self.modes.retain(|(m, _)| *m != mode);
        self.modes.push((mode, controller));
        self
    }

    pub fn with_routine(mut self, routine: Routine) -> Self {
        self.routines.retain(|r| r.name() != routine.name());
        self.routines.push(routine);
        self
    }

    /// Build every configured mode and routine
    ///
    /// Routines are prepared on the bus, which sets each move's speed.
    pub fn from_config<B: ServoBus>(bus: &mut B, config: &RobotConfig) -> Result<Self, MotionError> {
        let mut arbitrator = Self::new();

        for mode in &config.modes {
            let mut controller = CyclicController::new(mode.mode.name());
            for limb in &mode.limbs {
                let id = config.servo_id(&limb.servo)?;
                let oscillator = Oscillator::new(limb.min, limb.max, limb.step, limb.start, limb.enabled)?;
                controller = controller.with_limb(&limb.servo, id, oscillator);
            }
            arbitrator = arbitrator.with_mode(mode.mode, controller);
        }

        for routine in &config.routines {
            arbitrator = arbitrator.with_routine(Routine::build(bus, routine, config)?);
        }

        info!(
            "Arbitrator ready: {} modes, {} routines",
            arbitrator.modes.len(),
            arbitrator.routines.len()
        );
        Ok(arbitrator)
    }

    pub fn active(&self) -> Option<Mode> {
        self.active
    }

    pub fn controller(&self, mode: Mode) -> Option<&CyclicController> {
        self.modes.iter().find(|(m, _)| *m == mode).map(|(_, c)| c)
    }

    /// Stop whatever is running, then start `mode`
    ///
    /// Activating the mode that is already active does nothing. Returns the
    /// number of servo writes that failed while homing.
    pub fn activate<B: ServoBus>(&mut self, mode: Mode, bus: &mut B) -> Result<usize, MotionError> {
        if self.active == Some(mode) {
            return Ok(0);
        }
        let index = self
            .modes
            .iter()
            .position(|(m, _)| *m == mode)
            .ok_or(MotionError::UnconfiguredMode(mode))?;

        let mut faults = self.deactivate_all(bus);
        faults += self.modes[index].1.start(bus);
        self.active = Some(mode);
        Ok(faults)
    }

    /// Stop every cyclic mode, homing its servos
    pub fn deactivate_all<B: ServoBus>(&mut self, bus: &mut B) -> usize {
        self.active = None;
        self.modes.iter_mut().map(|(_, c)| c.stop(bus)).sum()
    }

    /// Run a named routine to completion
    pub async fn execute_routine<B: ServoBus>(&self, name: &str, bus: &mut B) -> Result<(), MotionError> {
        let routine = self
            .routines
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| MotionError::UnknownRoutine(name.to_string()))?;
        routine.execute(bus).await
    }

    /// Advance the running mode by one tick
    pub fn tick<B: ServoBus>(&mut self, bus: &mut B) -> usize {
        self.modes.iter_mut().map(|(_, c)| c.tick(bus)).sum()
    }

    /// Move every servo to the home pose of the first configured mode,
    /// confirming each one through its busy flag
    pub async fn park<B: ServoBus>(&self, bus: &mut B, poll: PollConfig) -> Vec<(ServoId, MotionStatus)> {
        let Some((mode, controller)) = self.modes.first() else {
            return Vec::new();
        };
        info!("Parking servos in {} home pose", mode.name());

        let mut report = Vec::new();
        for (id, position) in controller.home_positions() {
            let status = match move_to_pos(bus, id, position, poll).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Servo {}: cannot park: {}", id, e);
                    MotionStatus::Unknown
                }
            };
            if status != MotionStatus::Complete {
                warn!("Servo {}: parking ended {:?}", id, status);
            }
            report.push((id, status));
        }
        report
    }

    /// Dispatch one action
    ///
    /// Routines run only after every cyclic mode is stopped, so a maneuver
    /// never shares servos with background ticking.
    pub async fn handle<B: ServoBus>(&mut self, action: Action, bus: &mut B) -> Result<usize, MotionError> {
        match action {
            Action::Activate(mode) => self.activate(mode, bus),
            Action::Routine(name) => {
                let faults = self.deactivate_all(bus);
                self.execute_routine(&name, bus).await?;
                Ok(faults)
            }
            Action::Stop => Ok(self.deactivate_all(bus)),
        }
    }
}

/// Command a position and poll the busy flag until the servo settles
///
/// A failed flag read is logged and reported as `Unknown`, never as complete.
pub async fn move_to_pos<B: ServoBus>(
    bus: &mut B,
    id: ServoId,
    position: i32,
    poll: PollConfig,
) -> Result<MotionStatus, BusError> {
    bus.set_position(id, position)?;

    for _ in 0..poll.max_polls {
        match bus.is_moving(id) {
            Ok(false) => return Ok(MotionStatus::Complete),
            Ok(true) => tokio::time::sleep(poll.interval).await,
            Err(e) => {
                warn!("Servo {}: cannot read busy flag: {}", id, e);
                return Ok(MotionStatus::Unknown);
            }
        }
    }
    Ok(MotionStatus::StillMoving)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::TimedMove;
    use crate::motion::routine::FailurePolicy;
    use crate::motor::{BusCall, SimBus};
    use tokio::time::Instant;

    const FRONT: ServoId = 0x35;
    const BACK: ServoId = 0x08;

    fn arbitrator() -> Arbitrator {
        let arm = || Oscillator::new(-7000, 1000, 150, 1000, true).unwrap();
        Arbitrator::new()
            .with_mode(
                Mode::Forward,
                CyclicController::new("forward")
                    .with_limb("back", BACK, Oscillator::new(-700, 700, 350, 0, true).unwrap())
                    .with_limb("front", FRONT, arm()),
            )
            .with_mode(
                Mode::TurnLeft,
                CyclicController::new("turn_left")
                    .with_limb("back", BACK, Oscillator::new(-9200, -7800, 350, -8500, true).unwrap())
                    .with_limb("front", FRONT, arm()),
            )
    }

    #[test]
    fn test_switch_stops_previous_once() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let mut arb = arbitrator();

        arb.activate(Mode::Forward, &mut bus).unwrap();
        arb.tick(&mut bus);
        arb.tick(&mut bus);
        bus.clear_log();

        arb.activate(Mode::TurnLeft, &mut bus).unwrap();
        arb.tick(&mut bus);

        assert_eq!(
            bus.positions_written(),
            vec![
                // forward homed by its stop
                (BACK, 0),
                (FRONT, 1000),
                // turn_left homed by its start
                (BACK, -8500),
                (FRONT, 1000),
                // only turn_left ticks
                (BACK, -8150),
                (FRONT, 850),
            ]
        );
        assert_eq!(arb.active(), Some(Mode::TurnLeft));
        assert!(!arb.controller(Mode::Forward).unwrap().is_running());
        assert_eq!(arb.controller(Mode::Forward).unwrap().position("back"), Some(0));
    }

    #[test]
    fn test_at_most_one_running() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let mut arb = arbitrator();
        for mode in [Mode::Forward, Mode::TurnLeft, Mode::Forward, Mode::TurnLeft] {
            arb.activate(mode, &mut bus).unwrap();
            arb.tick(&mut bus);
            let running = [Mode::Forward, Mode::TurnLeft]
                .into_iter()
                .filter(|&m| arb.controller(m).unwrap().is_running())
                .count();
            assert_eq!(running, 1);
        }
    }

    #[test]
    fn test_reactivating_active_mode_is_noop() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let mut arb = arbitrator();
        arb.activate(Mode::Forward, &mut bus).unwrap();
        arb.tick(&mut bus);
        bus.clear_log();

        assert_eq!(arb.activate(Mode::Forward, &mut bus).unwrap(), 0);
        assert_eq!(bus.calls().count(), 0);
        assert_eq!(arb.controller(Mode::Forward).unwrap().position("back"), Some(350));
    }

    #[test]
    fn test_unconfigured_mode_keeps_current() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let mut arb = arbitrator();
        arb.activate(Mode::Forward, &mut bus).unwrap();

        assert!(matches!(
            arb.activate(Mode::TurnRight, &mut bus),
            Err(MotionError::UnconfiguredMode(Mode::TurnRight))
        ));
        assert_eq!(arb.active(), Some(Mode::Forward));
    }

    #[test]
    fn test_deactivate_all_homes_and_stops_ticking() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let mut arb = arbitrator();
        arb.activate(Mode::TurnLeft, &mut bus).unwrap();
        for _ in 0..7 {
            arb.tick(&mut bus);
        }

        arb.deactivate_all(&mut bus);
        assert_eq!(arb.active(), None);
        assert_eq!(bus.position(BACK), Some(-8500));
        assert_eq!(bus.position(FRONT), Some(1000));

        bus.clear_log();
        arb.tick(&mut bus);
        assert_eq!(bus.calls().count(), 0);

        // Stopping again is harmless
        assert_eq!(arb.deactivate_all(&mut bus), 0);
    }

    #[test]
    fn test_commands_map_to_actions() {
        assert_eq!(Action::from(&MotionCommand::Forward), Action::Activate(Mode::Forward));
        assert_eq!(Action::from(&MotionCommand::TurnLeft), Action::Activate(Mode::TurnLeft));
        assert_eq!(Action::from(&MotionCommand::TurnRight), Action::Activate(Mode::TurnRight));
        assert_eq!(Action::from(&MotionCommand::Back), Action::Stop);
        assert_eq!(Action::from(&MotionCommand::Stop), Action::Stop);
        assert_eq!(
            Action::from(&MotionCommand::Routine { name: "turn".to_string() }),
            Action::Routine("turn".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_routine_stops_cyclic_first() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let routine = Routine::new("lift", FailurePolicy::Hold)
            .with_move(TimedMove::new(&mut bus, FRONT, 1000, -8000, 30.0, false).unwrap());
        let mut arb = arbitrator().with_routine(routine);

        arb.handle(Action::Activate(Mode::Forward), &mut bus).await.unwrap();
        arb.tick(&mut bus);
        bus.clear_log();

        let started = Instant::now();
        arb.handle(Action::Routine("lift".to_string()), &mut bus).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(arb.active(), None);
        assert_eq!(
            bus.positions_written(),
            vec![(BACK, 0), (FRONT, 1000), (FRONT, -8000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_routine() {
        let mut bus = SimBus::new([FRONT, BACK]);
        let arb = arbitrator();
        assert!(matches!(
            arb.execute_routine("dance", &mut bus).await,
            Err(MotionError::UnknownRoutine(name)) if name == "dance"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_park_reports_each_servo() {
        let mut bus = SimBus::new([FRONT, BACK]);
        bus.fail_reads(FRONT, true);
        let arb = arbitrator();

        let report = arb.park(&mut bus, PollConfig::default()).await;
        assert_eq!(
            report,
            vec![(BACK, MotionStatus::Complete), (FRONT, MotionStatus::Unknown)]
        );
        assert_eq!(bus.position(BACK), Some(0));
        assert_eq!(bus.position(FRONT), Some(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_to_pos_complete() {
        let mut bus = SimBus::new([FRONT]);
        bus.set_busy_reads(FRONT, 3);
        let poll = PollConfig {
            max_polls: 10,
            interval: Duration::from_millis(20),
        };

        let started = Instant::now();
        let status = move_to_pos(&mut bus, FRONT, 500, poll).await.unwrap();
        assert_eq!(status, MotionStatus::Complete);
        assert_eq!(started.elapsed(), Duration::from_millis(60));
        assert_eq!(bus.calls().filter(|c| matches!(c, BusCall::ReadMoving { .. })).count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_to_pos_gives_up() {
        let mut bus = SimBus::new([FRONT]);
        bus.set_busy_reads(FRONT, 100);
        let poll = PollConfig {
            max_polls: 5,
            interval: Duration::from_millis(20),
        };
        let status = move_to_pos(&mut bus, FRONT, 500, poll).await.unwrap();
        assert_eq!(status, MotionStatus::StillMoving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_to_pos_read_failure_is_unknown() {
        let mut bus = SimBus::new([FRONT]);
        bus.fail_reads(FRONT, true);
        let status = move_to_pos(&mut bus, FRONT, 500, PollConfig::default()).await.unwrap();
        assert_eq!(status, MotionStatus::Unknown);
        assert_eq!(bus.position(FRONT), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_to_pos_write_failure_is_error() {
        let mut bus = SimBus::new([FRONT]);
        bus.fail_writes(FRONT, true);
        assert!(move_to_pos(&mut bus, FRONT, 500, PollConfig::default()).await.is_err());
    }
}
