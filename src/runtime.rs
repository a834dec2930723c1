// 50 Hz cooperative control loop
// Every cycle: take pending commands in arrival order, tick the running mode,
// publish state. A routine blocks the whole loop until its last move is done.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::config::{LOOP_HZ, RobotConfig, TOPIC_CMD_MOTION, TOPIC_STATE};
use crate::keyboard::{self, Input, Pending};
use crate::messages::{MotionCommand, RuntimeHealth, RuntimeState};
use crate::motion::{Action, Arbitrator, MotionError, MotionStatus, PollConfig};
use crate::motor::{ServoBus, ServoDriver, SimBus};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How the runtime was launched
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub port: String,
    pub sim: bool,
    pub keyboard: bool,
    pub config: Option<PathBuf>,
}

pub struct Runtime<B: ServoBus> {
    bus: B,
    arbitrator: Arbitrator,
    cycle_faults: usize,
    last_error: Option<String>,
    routine_done_at: Option<Instant>,
}

impl<B: ServoBus> Runtime<B> {
    pub fn new(mut bus: B, config: &RobotConfig) -> Result<Self, MotionError> {
        let arbitrator = Arbitrator::from_config(&mut bus, config)?;
        Ok(Self {
            bus,
            arbitrator,
            cycle_faults: 0,
            last_error: None,
            routine_done_at: None,
        })
    }

    /// Bring every servo to a known pose before taking commands
    pub async fn park(&mut self) -> bool {
        let report = self.arbitrator.park(&mut self.bus, PollConfig::default()).await;
        report.iter().all(|(_, status)| *status == MotionStatus::Complete)
    }

    /// Start of a loop cycle: health reflects this cycle only
    pub fn begin_cycle(&mut self) {
        self.cycle_faults = 0;
    }

    /// Process a queued command that arrived at `received_at`
    ///
    /// Routine requests queued while an earlier routine was running (key
    /// auto-repeat, impatient teleop) are dropped rather than replayed.
    pub async fn on_input(&mut self, cmd: MotionCommand, received_at: Instant) {
        if let MotionCommand::Routine { name } = &cmd {
            if self.routine_done_at.is_some_and(|done| received_at < done) {
                info!("Dropping routine {} requested while a routine was running", name);
                return;
            }
        }
        self.on_command(cmd).await;
    }

    /// Process one incoming command to completion
    pub async fn on_command(&mut self, cmd: MotionCommand) {
        info!("Received command: {:?}", &cmd);
        let is_routine = matches!(cmd, MotionCommand::Routine { .. });
        match self.arbitrator.handle(Action::from(&cmd), &mut self.bus).await {
            Ok(faults) => self.cycle_faults += faults,
            Err(e) => {
                warn!("Command {:?} failed: {}", cmd, e);
                self.cycle_faults += 1;
                self.last_error = Some(e.to_string());
            }
        }
        if is_routine {
            self.routine_done_at = Some(Instant::now());
        }
    }

    /// Advance the running mode
    pub fn on_tick(&mut self) {
        self.cycle_faults += self.arbitrator.tick(&mut self.bus);
    }

    pub fn state(&self) -> RuntimeState {
        RuntimeState {
            active_mode: self.arbitrator.active(),
            health: if self.cycle_faults == 0 {
                RuntimeHealth::Ok
            } else {
                RuntimeHealth::Degraded
            },
            last_error: self.last_error.clone(),
        }
    }

    /// Stop every mode, leaving the servos at home
    pub fn shutdown(&mut self) {
        info!("Shutting down, homing all servos");
        let faults = self.arbitrator.deactivate_all(&mut self.bus);
        if faults > 0 {
            warn!("{} servos could not be homed", faults);
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

impl<B: ServoBus> Drop for Runtime<B> {
    fn drop(&mut self) {
        // Any exit path leaves the servos at home, not mid-stroke
        if self.arbitrator.active().is_some() {
            self.shutdown();
        }
    }
}

/// Queue a JSON command from the network behind whatever is already pending
pub fn forward_payload(tx: &mpsc::Sender<Pending>, payload: &[u8]) {
    match serde_json::from_slice::<MotionCommand>(payload) {
        Ok(cmd) => {
            let pending = Pending {
                received_at: Instant::now(),
                input: Input::Command(cmd),
            };
            if let Err(e) = tx.try_send(pending) {
                warn!("Dropping command, queue unavailable: {}", e);
            }
        }
        Err(e) => warn!("Failed to parse command: {}", e),
    }
}

pub async fn run(opts: RunOptions) -> Result<(), BoxError> {
    let config = match &opts.config {
        Some(path) => {
            info!("Loading robot config from {}", path.display());
            RobotConfig::load(path)?
        }
        None => RobotConfig::default(),
    };

    if opts.sim {
        info!("Running against the simulated servo bus");
        drive(SimBus::new(config.servo_ids()), &config, opts.keyboard).await
    } else {
        let mut driver = ServoDriver::new(&opts.port, config.servo_ids())?;
        driver.initialize()?;
        drive(driver, &config, opts.keyboard).await
    }
}

async fn drive<B: ServoBus>(bus: B, config: &RobotConfig, use_keyboard: bool) -> Result<(), BoxError> {
    let mut runtime = Runtime::new(bus, config)?;
    if !runtime.park().await {
        warn!("Not every servo confirmed its park position");
    }

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    // Network and keyboard commands share one queue, so they run in arrival order
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Pending>(32);

    info!("Setting up publishers and subscribers...");
    let zenoh_tx = cmd_tx.clone();
    let _subscriber = session
        .declare_subscriber(TOPIC_CMD_MOTION)
        .callback(move |sample| forward_payload(&zenoh_tx, &sample.payload().to_bytes()))
        .await?;
    let pub_state = session.declare_publisher(TOPIC_STATE).await?;

    let _raw_mode = if use_keyboard {
        Some(keyboard::spawn(cmd_tx)?)
    } else {
        None
    };

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    // After a routine, resume the normal rate instead of bursting missed ticks
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("Runtime started: {}Hz loop", LOOP_HZ);
    info!("Subscribed to: {}", TOPIC_CMD_MOTION);
    info!("Publishing to: {}", TOPIC_STATE);

    'control: loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break 'control;
            }
        }
        runtime.begin_cycle();

        // 1. Drain all pending commands (non-blocking), in arrival order
        loop {
            match cmd_rx.try_recv() {
                Ok(Pending {
                    received_at,
                    input: Input::Command(cmd),
                }) => runtime.on_input(cmd, received_at).await,
                Ok(Pending {
                    input: Input::Quit, ..
                }) => break 'control,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        // 2. Advance the running mode
        runtime.on_tick();

        // 3. Publish state; a lost update must not end the loop
        match serde_json::to_string(&runtime.state()) {
            Ok(state_json) => {
                if let Err(e) = pub_state.put(state_json).await {
                    warn!("Failed to publish state: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode state: {}", e),
        }
    }

    runtime.shutdown();
    Ok(())
}
