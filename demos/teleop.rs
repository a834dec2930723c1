// Keyboard teleop over Zenoh: arrows=modes, space=stop, W/A/D=maneuvers, Q quit
use crawler_runtime::config::TOPIC_CMD_MOTION;
use crawler_runtime::keyboard::{Input, key_to_input};
use crossterm::{
    event::{self, Event},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTION).await?;

    info!("Controls: arrows=modes, space=stop, W/A/D=maneuvers, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        // Commands are latched by the runtime, so only key presses are sent
        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        match key_to_input(key) {
            Some(Input::Command(cmd)) => {
                info!("Sending {:?}", cmd);
                publisher.put(serde_json::to_string(&cmd)?).await?;
            }
            Some(Input::Quit) => break,
            None => {}
        }
    }

    Ok(())
}
