use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crawler_runtime::config::MOTOR_PORT;
use crawler_runtime::runtime::{self, RunOptions};

/// Drive the crawler from directional commands
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port of the servo bus
    #[arg(long, default_value = MOTOR_PORT)]
    port: String,

    /// Use the simulated servo bus instead of hardware
    #[arg(long)]
    sim: bool,

    /// Read commands from this terminal's keyboard as well as Zenoh
    #[arg(long)]
    keyboard: bool,

    /// JSON robot description replacing the built-in one
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let opts = RunOptions {
        port: args.port,
        sim: args.sim,
        keyboard: args.keyboard,
        config: args.config,
    };

    if let Err(e) = runtime::run(opts).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
