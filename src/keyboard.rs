// Local keyboard input: arrows drive the modes, space stops, Q quits
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::messages::MotionCommand;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What a key press asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(MotionCommand),
    Quit,
}

/// An input waiting in the command queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub received_at: Instant,
    pub input: Input,
}

/// Map a key press to an input, ignoring releases and unbound keys
pub fn key_to_input(key: KeyEvent) -> Option<Input> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let routine = |name: &str| {
        Some(Input::Command(MotionCommand::Routine {
            name: name.to_string(),
        }))
    };

    match key.code {
        KeyCode::Up => Some(Input::Command(MotionCommand::Forward)),
        KeyCode::Left => Some(Input::Command(MotionCommand::TurnLeft)),
        KeyCode::Right => Some(Input::Command(MotionCommand::TurnRight)),
        KeyCode::Down => Some(Input::Command(MotionCommand::Back)),
        KeyCode::Char(' ') => Some(Input::Command(MotionCommand::Stop)),

        // One-shot maneuvers
        KeyCode::Char('w') => routine("forward_stroke"),
        KeyCode::Char('a') => routine("turn_left_step"),
        KeyCode::Char('d') => routine("turn_right_step"),

        // Raw mode swallows SIGINT, so Ctrl-C arrives as a key
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Input::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(Input::Quit),
        _ => None,
    }
}

/// Restores the terminal when dropped
pub struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}

/// Read keys on a blocking thread and forward them to `tx`
///
/// The thread exits after Quit or once the receiver is gone.
pub fn spawn(tx: mpsc::Sender<Pending>) -> std::io::Result<RawModeGuard> {
    enable_raw_mode()?;
    info!("Keyboard: arrows=modes, space=stop, W/A/D=maneuvers, Q=quit");

    std::thread::spawn(move || {
        if let Err(e) = read_keys(&tx) {
            warn!("Keyboard input stopped: {}", e);
            let _ = tx.blocking_send(Pending {
                received_at: Instant::now(),
                input: Input::Quit,
            });
        }
    });
    Ok(RawModeGuard)
}

fn read_keys(tx: &mpsc::Sender<Pending>) -> std::io::Result<()> {
    loop {
        if !event::poll(POLL_INTERVAL)? {
            if tx.is_closed() {
                return Ok(());
            }
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let Some(input) = key_to_input(key) else {
            continue;
        };

        let quit = input == Input::Quit;
        let pending = Pending {
            received_at: Instant::now(),
            input,
        };
        if tx.blocking_send(pending).is_err() || quit {
            return Ok(());
        }
    }
}
