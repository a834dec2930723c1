// Servo diagnostic: READ-ONLY status dump of the crawler servos
//
// This tool does NOT write anything to the servos - it's completely safe.
//
// Usage: cargo run --example servo_diagnostic -- [port]

use crawler_runtime::config::{MOTOR_PORT, RobotConfig};
use crawler_runtime::motor::FeetechBus;
use crawler_runtime::motor::feetech::Register;
use crawler_runtime::motor::units::{raw_to_rpm, steps_to_centideg};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| MOTOR_PORT.to_string());
    let config = RobotConfig::default();

    println!("Crawler servo diagnostic (read-only)");
    println!("Serial port: {}", port);
    println!();

    let mut bus = match FeetechBus::open(&port) {
        Ok(bus) => bus,
        Err(e) => {
            println!("Failed to open serial port: {}", e);
            println!("  - Check the port path is correct");
            println!("  - Verify the USB adapter and servo power");
            return Err(e.into());
        }
    };

    for servo in &config.servos {
        println!("=== {} (ID 0x{:02X}) ===", servo.name, servo.id);

        match bus.ping(servo.id) {
            Ok(true) => println!("  Ping:             responding"),
            Ok(false) => {
                println!("  Ping:             NO RESPONSE");
                println!();
                continue;
            }
            Err(e) => {
                println!("  Ping:             ERROR - {}", e);
                println!();
                continue;
            }
        }

        match bus.read_u8(servo.id, Register::OperatingMode) {
            Ok(0) => println!("  Operating Mode:   0 (Position)"),
            Ok(mode) => println!("  Operating Mode:   {} (runtime needs Position)", mode),
            Err(e) => println!("  Operating Mode:   ERROR - {}", e),
        }

        match bus.read_u8(servo.id, Register::TorqueEnable) {
            Ok(val) => println!("  Torque Enable:    {}", val),
            Err(e) => println!("  Torque Enable:    ERROR - {}", e),
        }

        match bus.get_position(servo.id) {
            Ok(steps) => println!(
                "  Present Position: {} ({} centideg)",
                steps,
                steps_to_centideg(steps)
            ),
            Err(e) => println!("  Present Position: ERROR - {}", e),
        }

        // Goal speed as stored, which is what timed moves are estimated from
        match bus.get_goal_speed(servo.id) {
            Ok(raw) => println!("  Goal Speed:       {} ({:.2} rpm)", raw, raw_to_rpm(raw)),
            Err(e) => println!("  Goal Speed:       ERROR - {}", e),
        }

        // Bit 15 carries the direction; the magnitude uses the goal speed scale
        match bus.read_u16(servo.id, Register::PresentSpeed) {
            Ok(raw) => println!(
                "  Present Speed:    {} ({:.2} rpm{})",
                raw,
                raw_to_rpm(raw & 0x7FFF),
                if raw & 0x8000 != 0 { ", reverse" } else { "" }
            ),
            Err(e) => println!("  Present Speed:    ERROR - {}", e),
        }

        match bus.is_moving(servo.id) {
            Ok(moving) => println!("  Moving:           {}", moving),
            Err(e) => println!("  Moving:           ERROR - {}", e),
        }
        println!();
    }

    Ok(())
}
